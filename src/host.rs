//! Host runtime boundary
//!
//! The tracer runs with zero cooperation from the traced program. All it
//! needs from the runtime that executes it is expressed here:
//!
//! ```text
//! ┌──────────────────────────┐  TraceEvent + &dyn Frame   ┌──────────────┐
//! │ host runtime             │ ─────────────────────────▶ │ HookHandle   │
//! │  (instruction-level      │                            │  (TraceHook) │
//! │   trace facility)        │ ◀───── install / remove ── │ suspension,  │
//! └──────────────────────────┘       (HookRegistry)       │ session      │
//!                                                         └──────────────┘
//! ```
//!
//! Everything here is single-threaded: hooks are invoked in-line with the
//! traced program, and a `HookHandle` is `!Send`.

use crate::error::EvalError;
use crate::hook::HookHandle;
use crate::value::Value;

/// Stable identity of one routine activation (one call frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(pub u64);

/// Identity of one call stack (one thread of the host runtime)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StackId(pub u64);

/// Name resolution and expression evaluation in a frame's scope
pub trait ScopeResolver {
    /// Value bound to `name`, locals first, then globals
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Evaluate `expr` (a dotted path) against locals and globals
    fn evaluate(&self, expr: &str) -> Result<Value, EvalError>;
}

/// One call frame of the traced program
pub trait Frame {
    /// Source origin: a file path or an interactive cell pseudo-path
    fn origin(&self) -> &str;

    /// Name of the routine executing in this frame
    fn routine(&self) -> &str;

    /// Current line number, 1-indexed
    fn line(&self) -> u32;

    fn activation(&self) -> ActivationId;

    fn stack(&self) -> StackId;

    /// The frame that called this one
    fn caller(&self) -> Option<&dyn Frame>;

    fn scope(&self) -> &dyn ScopeResolver;

    /// Whether this frame's globals carry the "tracing active" flag
    fn is_tracing_active(&self) -> bool;

    /// Set or clear the "tracing active" flag in this frame's globals
    fn set_tracing_active(&self, active: bool);
}

/// An instruction-boundary event fired by the host runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraceEvent<'a> {
    /// A routine was entered
    Call,
    /// A line is about to execute
    Line,
    /// A routine is returning the given value
    Return(&'a Value),
    /// An exception is propagating through the frame
    Exception,
}

impl TraceEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            TraceEvent::Call => "call",
            TraceEvent::Line => "line",
            TraceEvent::Return(_) => "return",
            TraceEvent::Exception => "exception",
        }
    }
}

/// The runtime's hook registration facility
pub trait HookRegistry {
    /// Hook currently installed on the stack `frame` belongs to
    fn installed(&self, frame: &dyn Frame) -> Option<HookHandle>;

    /// Install `hook` on the stack `frame` belongs to; `None` removes it
    fn install(&mut self, frame: &dyn Frame, hook: Option<HookHandle>);
}

/// Nearest frame, walking outward from `frame`, whose globals are flagged
/// tracing-active
pub fn tracing_frame(frame: &dyn Frame) -> Option<&dyn Frame> {
    let mut current = Some(frame);
    while let Some(f) = current {
        if f.is_tracing_active() {
            return Some(f);
        }
        current = f.caller();
    }
    None
}
