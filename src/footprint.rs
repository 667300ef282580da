//! Footprint store
//!
//! A [`Footprint`] is the deduplicated, step-stamped record of the values a
//! traced execution computed. It is built by the hook engine while the
//! execution runs and is read-only afterwards: downstream consumers either
//! read it or [`combine`](Footprint::combine) several into a new one.
//!
//! # Ordering
//!
//! Insertion order is *not* step order. A deferred assignment is appended
//! when its routine returns but carries the step of the assignment line.
//! Use [`Footprint::sorted_by_step`] when chronology matters.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::addresser::{CanonicalAddresser, ContentAddresser, ContentHash};
use crate::config::SkipSet;
use crate::error::TrackingError;
use crate::value::Value;

/// One value observed during a traced execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedValue {
    snapshot: Value,
    step: u64,
    content_hash: ContentHash,
}

impl ObservedValue {
    /// Copy of the value taken when it was observed
    pub fn snapshot(&self) -> &Value {
        &self.snapshot
    }

    /// Logical step at which the value was observed
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn content_hash(&self) -> ContentHash {
        self.content_hash
    }
}

/// A routine entered during tracing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub origin: String,
    pub routine: String,
}

/// What recording did with a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recorded {
    /// New content, appended
    Appended,
    /// Content already present, nothing changed
    Duplicate,
    /// Content already present at a later step; moved back to the earlier one
    Retagged,
    /// Category is in the skip set
    Skipped,
}

/// Ordered, deduplicated record of observed values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "FootprintData", into = "FootprintData")]
pub struct Footprint {
    values: Vec<ObservedValue>,
    /// content hash -> position in `values`
    index: FnvHashMap<ContentHash, usize>,
    step_counter: u64,
    calls: Vec<CallSite>,
    imports: BTreeSet<String>,
}

#[derive(Serialize, Deserialize)]
struct FootprintData {
    values: Vec<ObservedValue>,
    step_counter: u64,
    calls: Vec<CallSite>,
    imports: BTreeSet<String>,
}

impl From<FootprintData> for Footprint {
    fn from(data: FootprintData) -> Self {
        let mut footprint = Footprint {
            values: data.values,
            index: FnvHashMap::default(),
            step_counter: data.step_counter,
            calls: data.calls,
            imports: data.imports,
        };
        footprint.rebuild_index();
        footprint
    }
}

impl From<Footprint> for FootprintData {
    fn from(footprint: Footprint) -> Self {
        FootprintData {
            values: footprint.values,
            step_counter: footprint.step_counter,
            calls: footprint.calls,
            imports: footprint.imports,
        }
    }
}

impl PartialEq for Footprint {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
            && self.step_counter == other.step_counter
            && self.calls == other.calls
            && self.imports == other.imports
    }
}

impl Footprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` with the default skip set and addresser
    #[cfg(test)]
    pub(crate) fn record(
        &mut self,
        value: &Value,
        step: Option<u64>,
    ) -> Result<Recorded, TrackingError> {
        self.record_with(value, step, &SkipSet::default(), &CanonicalAddresser)
    }

    /// Record `value` unless it is skipped, unaddressable, or already present
    ///
    /// `step` defaults to the current step counter. When the content is
    /// already present at a later step than an explicit `step`, the existing
    /// record is moved back to `step`: the earliest logical observation wins.
    pub(crate) fn record_with(
        &mut self,
        value: &Value,
        step: Option<u64>,
        skip: &SkipSet,
        addresser: &dyn ContentAddresser,
    ) -> Result<Recorded, TrackingError> {
        if let Some(package) = value.defining_package() {
            if !self.imports.contains(package) {
                self.imports.insert(package.to_string());
            }
        }

        if skip.contains(value.category()) {
            return Ok(Recorded::Skipped);
        }

        let content_hash = addresser.address(value)?;

        if let Some(&position) = self.index.get(&content_hash) {
            let existing = &mut self.values[position];
            return Ok(match step {
                Some(step) if step < existing.step => {
                    existing.step = step;
                    Recorded::Retagged
                }
                _ => Recorded::Duplicate,
            });
        }

        self.index.insert(content_hash, self.values.len());
        self.values.push(ObservedValue {
            snapshot: value.clone(),
            step: step.unwrap_or(self.step_counter),
            content_hash,
        });
        Ok(Recorded::Appended)
    }

    /// Move to the next logical step, returning it
    pub(crate) fn advance_step(&mut self) -> u64 {
        self.step_counter += 1;
        self.step_counter
    }

    pub(crate) fn record_call(&mut self, origin: &str, routine: &str) {
        self.calls.push(CallSite {
            origin: origin.to_string(),
            routine: routine.to_string(),
        });
    }

    /// Combine footprints of consecutive executions, oldest first
    ///
    /// Steps of each footprint are offset by the total step count of the
    /// footprints before it. A content hash seen more than once keeps its
    /// earliest record in combined order.
    pub fn combine<'a, I>(footprints: I) -> Footprint
    where
        I: IntoIterator<Item = &'a Footprint>,
    {
        let mut combined = Footprint::new();
        let mut parts = 0usize;

        for footprint in footprints {
            let offset = combined.step_counter;
            for observed in &footprint.values {
                if combined.index.contains_key(&observed.content_hash) {
                    continue;
                }
                combined
                    .index
                    .insert(observed.content_hash, combined.values.len());
                combined.values.push(ObservedValue {
                    snapshot: observed.snapshot.clone(),
                    step: observed.step + offset,
                    content_hash: observed.content_hash,
                });
            }
            combined.calls.extend(footprint.calls.iter().cloned());
            combined.imports.extend(footprint.imports.iter().cloned());
            combined.step_counter += footprint.step_counter;
            parts += 1;
        }

        tracing::debug!(
            parts,
            values = combined.values.len(),
            steps = combined.step_counter,
            "combined footprints"
        );
        combined
    }

    /// Drop every record that no longer addresses, using the default addresser
    pub fn prune_unaddressable(&mut self) -> usize {
        self.prune_unaddressable_with(&CanonicalAddresser)
    }

    /// Drop every record for which `addresser.verify` fails; returns how many
    pub fn prune_unaddressable_with(&mut self, addresser: &dyn ContentAddresser) -> usize {
        let before = self.values.len();
        self.values.retain(|observed| match addresser.verify(&observed.snapshot) {
            Ok(_) => true,
            Err(err) => {
                tracing::trace!(hash = %observed.content_hash, %err, "pruning value");
                false
            }
        });
        let pruned = before - self.values.len();
        if pruned > 0 {
            self.rebuild_index();
        }
        tracing::debug!(pruned, kept = self.values.len(), "pruned unaddressable values");
        pruned
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .values
            .iter()
            .enumerate()
            .map(|(position, observed)| (observed.content_hash, position))
            .collect();
    }

    /// Records in insertion order
    pub fn values(&self) -> &[ObservedValue] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObservedValue> {
        self.values.iter()
    }

    /// Records in chronological order (stable for equal steps)
    pub fn sorted_by_step(&self) -> Vec<&ObservedValue> {
        let mut sorted: Vec<&ObservedValue> = self.values.iter().collect();
        sorted.sort_by_key(|observed| observed.step);
        sorted
    }

    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains_hash(&self, hash: &ContentHash) -> bool {
        self.index.contains_key(hash)
    }

    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }
}

impl<'a> IntoIterator for &'a Footprint {
    type Item = &'a ObservedValue;
    type IntoIter = std::slice::Iter<'a, ObservedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
