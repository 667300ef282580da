//! Content addressing for observed values
//!
//! A value's address is the SHA-256 digest of its canonical MessagePack
//! encoding. Structurally equal values at the same point in time get the
//! same address; live values (handles, generators, foreign objects) get none.
//!
//! # Canonical form
//!
//! - Sets are normalized: elements sorted by their own encoding, duplicates dropped
//! - Maps keep insertion order (two maps with different order are different values)
//! - Everything else is encoded as-is

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;

use crate::error::TrackingError;
use crate::value::Value;

/// SHA-256 digest of a value's canonical encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Produces stable hashes for values
///
/// Implementations must never panic; a value that cannot be addressed is an
/// `Err`, which callers on the hot path drop.
pub trait ContentAddresser {
    /// Hash `value`, or explain why it has no address
    fn address(&self, value: &Value) -> Result<ContentHash, TrackingError>;

    /// Stricter check used after a footprint crosses a process or storage
    /// boundary. Defaults to [`ContentAddresser::address`].
    fn verify(&self, value: &Value) -> Result<ContentHash, TrackingError> {
        self.address(value)
    }
}

/// Default addresser: MessagePack (`rmp-serde`) + SHA-256
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalAddresser;

impl CanonicalAddresser {
    pub fn new() -> Self {
        Self
    }

    /// Canonical byte encoding of `value`
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, TrackingError> {
        if let Some(category) = value.find_unaddressable() {
            return Err(TrackingError::Unaddressable { category });
        }
        let canonical = canonical_form(value)?;
        encode_raw(&canonical)
    }

    /// Whether `value` decodes back from its encoding to something with the
    /// same address
    pub fn round_trips(&self, value: &Value) -> Result<ContentHash, TrackingError> {
        let bytes = self.encode(value)?;
        let expected = digest(&bytes);
        let decoded: Value = rmp_serde::from_slice(&bytes)
            .map_err(|e| TrackingError::Serialization(e.to_string()))?;
        if self.address(&decoded)? != expected {
            return Err(TrackingError::NotReconstructible);
        }
        Ok(expected)
    }
}

impl ContentAddresser for CanonicalAddresser {
    fn address(&self, value: &Value) -> Result<ContentHash, TrackingError> {
        let bytes = self.encode(value)?;
        Ok(digest(&bytes))
    }

    fn verify(&self, value: &Value) -> Result<ContentHash, TrackingError> {
        self.round_trips(value)
    }
}

fn digest(bytes: &[u8]) -> ContentHash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    ContentHash(out)
}

fn encode_raw(value: &Value) -> Result<Vec<u8>, TrackingError> {
    rmp_serde::to_vec(value).map_err(|e| TrackingError::Serialization(e.to_string()))
}

/// Borrow `value` unless it contains a set that needs reordering
fn canonical_form(value: &Value) -> Result<Cow<'_, Value>, TrackingError> {
    if contains_set(value) {
        Ok(Cow::Owned(normalize(value)?))
    } else {
        Ok(Cow::Borrowed(value))
    }
}

fn contains_set(value: &Value) -> bool {
    match value {
        Value::Set(_) => true,
        Value::List(items) | Value::Tuple(items) => items.iter().any(contains_set),
        Value::Map(entries) => entries
            .iter()
            .any(|(k, v)| contains_set(k) || contains_set(v)),
        Value::Object { fields, .. } => fields.values().any(contains_set),
        Value::Module { members, .. } => members.values().any(contains_set),
        _ => false,
    }
}

fn normalize(value: &Value) -> Result<Value, TrackingError> {
    let normalized = match value {
        Value::Set(items) => {
            let mut keyed = items
                .iter()
                .map(|item| {
                    let item = normalize(item)?;
                    Ok((encode_raw(&item)?, item))
                })
                .collect::<Result<Vec<_>, TrackingError>>()?;
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            keyed.dedup_by(|a, b| a.0 == b.0);
            Value::Set(keyed.into_iter().map(|(_, item)| item).collect())
        }
        Value::List(items) => Value::List(normalize_all(items)?),
        Value::Tuple(items) => Value::Tuple(normalize_all(items)?),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((normalize(k)?, normalize(v)?)))
                .collect::<Result<_, TrackingError>>()?,
        ),
        Value::Object {
            class,
            module,
            fields,
        } => Value::Object {
            class: class.clone(),
            module: module.clone(),
            fields: fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), normalize(v)?)))
                .collect::<Result<_, TrackingError>>()?,
        },
        Value::Module { name, members } => Value::Module {
            name: name.clone(),
            members: members
                .iter()
                .map(|(k, v)| Ok((k.clone(), normalize(v)?)))
                .collect::<Result<_, TrackingError>>()?,
        },
        other => other.clone(),
    };
    Ok(normalized)
}

fn normalize_all(items: &[Value]) -> Result<Vec<Value>, TrackingError> {
    items.iter().map(normalize).collect()
}
