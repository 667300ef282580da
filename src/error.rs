//! Error types for the footprint tracer
//!
//! None of these ever reach the traced program. The hook path turns every
//! `TrackingError` into a `trace!` line and moves on; only configuration
//! loading reports errors to its caller.

use thiserror::Error;

use crate::value::ValueCategory;

/// Why a candidate value did not make it into a footprint
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("value of category {category} cannot be content-addressed")]
    Unaddressable { category: ValueCategory },

    #[error("canonical encoding failed: {0}")]
    Serialization(String),

    #[error("value did not survive an encode/decode round trip")]
    NotReconstructible,

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),
}

/// Failure to resolve a name or evaluate an expression in a frame's scope
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("name '{0}' is not bound")]
    Unbound(String),

    #[error("'{owner}' has no attribute '{attribute}'")]
    NoAttribute { owner: String, attribute: String },

    #[error("not an evaluable expression: {0}")]
    Syntax(String),

    #[error("evaluation raised: {0}")]
    Raised(String),
}

/// Invalid tracer configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid interactive origin pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("traced file path must not be empty")]
    EmptyPath,

    #[error("failed to parse tracer config: {0}")]
    Parse(#[from] toml::de::Error),
}
