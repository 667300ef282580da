//! Huella - value-footprint tracer
//!
//! Attaches to a host runtime's instruction-level trace facility and records
//! every distinct value a traced program computes, stamped with the logical
//! step at which it first appeared. The resulting [`Footprint`] is what a
//! grader compares against reference solutions: "did the student compute
//! these values, in this order?"
//!
//! The host runtime stays behind the traits in [`host`]; [`sim`] provides an
//! in-memory implementation for tests and embedders.

pub mod addresser;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod footprint;
pub mod hook;
pub mod host;
pub mod lines;
pub mod session;
pub mod sim;
pub mod suspension;
pub mod value;

pub use addresser::{CanonicalAddresser, ContentAddresser, ContentHash};
pub use config::{SkipSet, TraceOrigins, TracerConfig};
pub use context::{SuppressionSwitch, TracingContext};
pub use error::{ConfigError, EvalError, TrackingError};
pub use footprint::{CallSite, Footprint, ObservedValue};
pub use hook::{create_tracer, FootprintHandle, HookHandle, HookState, TracerBuilder};
pub use host::{Frame, HookRegistry, ScopeResolver, TraceEvent};
pub use lines::{LineCache, LineSource};
pub use session::TraceSession;
pub use suspension::{resume, suspend, without_tracing};
pub use value::{Value, ValueCategory};
