//! Trace hook engine
//!
//! The per-event callback the host runtime invokes at every instruction
//! boundary. For each event it decides which values are worth recording and
//! feeds them to the [`Footprint`].
//!
//! # Per-event algorithm
//!
//! ```text
//! event ──▶ origin traced? ──yes──▶ advance step
//!              │
//!              ▼
//!        suppressed? ──yes──▶ done
//!              │
//!   ┌──────────┴───────────────────────────────────────────────┐
//!   │ traced origin, line/return:                              │
//!   │   evaluate dotted paths, look up names, record results   │
//!   │   defer assignment targets (step captured now)           │
//!   │   return: record the returned value                      │
//!   │ untraced origin, return into a traced caller:            │
//!   │   record the returned value                              │
//!   │ any return: resolve this activation's deferred targets   │
//!   │   in the returning frame, tagged with their own step     │
//!   └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in here returns an error or panics into the traced program:
//! every recording outcome is an explicit `Result` that is logged and dropped.

use fnv::FnvHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::addresser::{CanonicalAddresser, ContentAddresser};
use crate::config::{SkipSet, TracerConfig};
use crate::context::{SuppressionSwitch, TracingContext};
use crate::error::TrackingError;
use crate::extract::{assignment_targets, tokenize};
use crate::footprint::{Footprint, Recorded};
use crate::host::{ActivationId, Frame, TraceEvent};
use crate::lines::{LineCache, LineSource};
use crate::value::Value;

/// Lifecycle of a hook
///
/// `Idle -> Armed -> (Evaluating -> Armed)* -> Idle`. Events are only
/// processed in `Armed`; anything arriving while `Evaluating` (a host
/// evaluation re-entering the hook) or `Idle` is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Idle,
    Armed,
    Evaluating,
}

/// An assignment target waiting for its routine to return
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingAssignment {
    name: String,
    step: u64,
}

/// Side table of deferred assignment targets, keyed by activation
#[derive(Debug, Default)]
struct PendingAssignments {
    by_activation: FnvHashMap<ActivationId, Vec<PendingAssignment>>,
}

impl PendingAssignments {
    fn push(&mut self, activation: ActivationId, name: &str, step: u64) {
        self.by_activation
            .entry(activation)
            .or_default()
            .push(PendingAssignment {
                name: name.to_string(),
                step,
            });
    }

    fn take(&mut self, activation: ActivationId) -> Option<Vec<PendingAssignment>> {
        self.by_activation.remove(&activation)
    }

    fn len(&self) -> usize {
        self.by_activation.values().map(Vec::len).sum()
    }
}

/// The trace callback and everything it needs
pub struct TraceHook {
    footprint: Rc<RefCell<Footprint>>,
    config: TracerConfig,
    addresser: Box<dyn ContentAddresser>,
    lines: Box<dyn LineSource>,
    pending: PendingAssignments,
    suppression: SuppressionSwitch,
    state: HookState,
}

impl fmt::Debug for TraceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceHook")
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("suppressed", &self.suppression.is_suppressed())
            .finish_non_exhaustive()
    }
}

impl TraceHook {
    pub fn state(&self) -> HookState {
        self.state
    }

    /// Handle one event from the host runtime
    pub fn on_event(&mut self, frame: &dyn Frame, event: TraceEvent<'_>) {
        if self.state != HookState::Armed {
            return;
        }
        self.state = HookState::Evaluating;
        self.process(frame, event);
        self.state = HookState::Armed;
    }

    fn process(&mut self, frame: &dyn Frame, event: TraceEvent<'_>) {
        let TraceHook {
            footprint,
            config,
            addresser,
            lines,
            pending,
            suppression,
            ..
        } = self;

        let Ok(mut footprint) = footprint.try_borrow_mut() else {
            tracing::trace!(event = event.name(), "footprint busy, event dropped");
            return;
        };
        let recorder = Recorder {
            skip: &config.skip,
            addresser: addresser.as_ref(),
        };

        let traced = config.origins.contains(frame.origin());
        if traced {
            footprint.advance_step();
        }

        let activation = frame.activation();

        if suppression.is_suppressed() {
            // the activation is gone; its targets can never resolve
            if let TraceEvent::Return(_) = event {
                if let Some(dropped) = pending.take(activation) {
                    tracing::trace!(dropped = dropped.len(), "suppressed return, targets dropped");
                }
            }
            return;
        }

        if let TraceEvent::Call = event {
            footprint.record_call(frame.origin(), frame.routine());
        }

        if traced {
            if matches!(event, TraceEvent::Line | TraceEvent::Return(_)) {
                let step = footprint.step_counter();
                if let Some(text) = lines.line(frame.origin(), frame.line()) {
                    let scope = frame.scope();
                    let tokens = tokenize(&text);

                    for path in &tokens.dotted {
                        let outcome = scope
                            .evaluate(path)
                            .map_err(TrackingError::from)
                            .and_then(|value| recorder.record(&mut footprint, &value, None));
                        discard(outcome);
                    }

                    for name in &tokens.names {
                        if let Some(value) = scope.lookup(name) {
                            discard(recorder.record(&mut footprint, &value, None));
                        }
                    }

                    for target in assignment_targets(&text) {
                        pending.push(activation, target, step);
                    }
                }
            }

            if let TraceEvent::Return(value) = event {
                discard(recorder.record(&mut footprint, value, None));
            }
        } else if let TraceEvent::Return(value) = event {
            let into_traced = frame
                .caller()
                .is_some_and(|caller| config.origins.contains(caller.origin()));
            if into_traced {
                discard(recorder.record(&mut footprint, value, None));
            }
        }

        if let TraceEvent::Return(_) = event {
            if let Some(deferred) = pending.take(activation) {
                let scope = frame.scope();
                for PendingAssignment { name, step } in deferred {
                    match scope.lookup(&name) {
                        Some(value) => {
                            discard(recorder.record(&mut footprint, &value, Some(step)))
                        }
                        None => tracing::trace!(%name, step, "deferred target never bound"),
                    }
                }
            }
        }
    }
}

/// Skip set and addresser borrowed for one event
struct Recorder<'a> {
    skip: &'a SkipSet,
    addresser: &'a dyn ContentAddresser,
}

impl Recorder<'_> {
    #[inline]
    fn record(
        &self,
        footprint: &mut Footprint,
        value: &Value,
        step: Option<u64>,
    ) -> Result<Recorded, TrackingError> {
        footprint.record_with(value, step, self.skip, self.addresser)
    }
}

/// Tracking is best effort: log why a value was not recorded and move on
#[inline]
fn discard(outcome: Result<Recorded, TrackingError>) {
    if let Err(err) = outcome {
        tracing::trace!(%err, "value not recorded");
    }
}

/// Cloneable handle to an installed (or installable) hook
///
/// This is what a [`HookRegistry`](crate::host::HookRegistry) stores and
/// what the host runtime calls on every event.
#[derive(Clone)]
pub struct HookHandle(Rc<RefCell<TraceHook>>);

impl HookHandle {
    fn new(hook: TraceHook) -> Self {
        Self(Rc::new(RefCell::new(hook)))
    }

    /// Deliver one event; dropped silently if the hook is already running
    pub fn dispatch(&self, frame: &dyn Frame, event: TraceEvent<'_>) {
        match self.0.try_borrow_mut() {
            Ok(mut hook) => hook.on_event(frame, event),
            Err(_) => tracing::trace!(event = event.name(), "re-entrant event dropped"),
        }
    }

    pub fn state(&self) -> HookState {
        self.0
            .try_borrow()
            .map(|hook| hook.state)
            .unwrap_or(HookState::Evaluating)
    }

    /// Start processing events
    pub fn arm(&self) {
        if let Ok(mut hook) = self.0.try_borrow_mut() {
            if hook.state == HookState::Idle {
                hook.state = HookState::Armed;
            }
        }
    }

    /// Stop processing events; deferred targets still pending are dropped
    pub fn disarm(&self) {
        if let Ok(mut hook) = self.0.try_borrow_mut() {
            hook.state = HookState::Idle;
            let dropped = hook.pending.len();
            hook.pending = PendingAssignments::default();
            if dropped > 0 {
                tracing::debug!(dropped, "disarmed with unresolved assignment targets");
            }
        }
    }

    /// Number of assignment targets awaiting their routine's return
    pub fn pending_assignments(&self) -> usize {
        self.0.try_borrow().map(|hook| hook.pending.len()).unwrap_or(0)
    }

    pub fn ptr_eq(&self, other: &HookHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(hook) => hook.fmt(f),
            Err(_) => f.write_str("TraceHook { state: Evaluating, .. }"),
        }
    }
}

/// Shared view of the footprint a hook is building
#[derive(Debug, Clone)]
pub struct FootprintHandle(Rc<RefCell<Footprint>>);

impl FootprintHandle {
    /// Run `f` against the footprint as it stands
    ///
    /// # Panics
    ///
    /// Panics if called from inside the hook's own evaluation.
    pub fn with<R>(&self, f: impl FnOnce(&Footprint) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Copy of the footprint as it stands
    pub fn snapshot(&self) -> Footprint {
        self.with(Footprint::clone)
    }

    pub fn len(&self) -> usize {
        self.with(Footprint::len)
    }

    pub fn is_empty(&self) -> bool {
        self.with(Footprint::is_empty)
    }

    /// Live step counter, usable for measuring steps between two points
    pub fn step_counter(&self) -> u64 {
        self.with(Footprint::step_counter)
    }

    /// Move the footprint out, leaving an empty one behind
    ///
    /// Call once tracing has ended; the result is the immutable footprint
    /// handed to downstream consumers.
    pub fn take(&self) -> Footprint {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Builds a footprint and the hook that fills it
pub struct TracerBuilder {
    config: TracerConfig,
    addresser: Box<dyn ContentAddresser>,
    lines: Box<dyn LineSource>,
}

impl TracerBuilder {
    pub fn new(config: TracerConfig) -> Self {
        Self {
            config,
            addresser: Box::new(CanonicalAddresser),
            lines: Box::new(LineCache::new()),
        }
    }

    pub fn with_addresser(mut self, addresser: impl ContentAddresser + 'static) -> Self {
        self.addresser = Box::new(addresser);
        self
    }

    pub fn with_line_source(mut self, lines: impl LineSource + 'static) -> Self {
        self.lines = Box::new(lines);
        self
    }

    /// Fresh empty footprint plus an armed hook bound to `context`
    pub fn build(self, context: &TracingContext) -> (FootprintHandle, HookHandle) {
        let footprint = Rc::new(RefCell::new(Footprint::new()));
        let hook = TraceHook {
            footprint: Rc::clone(&footprint),
            config: self.config,
            addresser: self.addresser,
            lines: self.lines,
            pending: PendingAssignments::default(),
            suppression: context.suppression().clone(),
            state: HookState::Armed,
        };
        tracing::debug!(
            skip = ?hook.config.skip.iter().collect::<Vec<_>>(),
            files = hook.config.origins.spec().files.len(),
            "tracer created"
        );
        (FootprintHandle(footprint), HookHandle::new(hook))
    }
}

impl Default for TracerBuilder {
    fn default() -> Self {
        Self::new(TracerConfig::default())
    }
}

/// Fresh footprint and armed hook with the default addresser and line cache
pub fn create_tracer(
    config: TracerConfig,
    context: &TracingContext,
) -> (FootprintHandle, HookHandle) {
    TracerBuilder::new(config).build(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimFrame;

    fn tracer_for(origin: &str, source: &str) -> (FootprintHandle, HookHandle, TracingContext) {
        let mut cache = LineCache::new();
        cache.register(origin, source);
        let context = TracingContext::new();
        let (footprint, hook) = TracerBuilder::default()
            .with_line_source(cache)
            .build(&context);
        (footprint, hook, context)
    }

    #[test]
    fn test_new_hook_is_armed() {
        let context = TracingContext::new();
        let (footprint, hook) = create_tracer(TracerConfig::default(), &context);
        assert_eq!(hook.state(), HookState::Armed);
        assert!(footprint.is_empty());
        assert_eq!(footprint.step_counter(), 0);
    }

    #[test]
    fn test_disarmed_hook_ignores_events() {
        let (footprint, hook, _context) = tracer_for("<ipython-input-1>", "x");
        let frame = SimFrame::new("<ipython-input-1>", "f", 1).with_local("x", Value::Int(5));

        hook.disarm();
        assert_eq!(hook.state(), HookState::Idle);
        hook.dispatch(&frame, TraceEvent::Line);
        assert_eq!(footprint.step_counter(), 0);

        hook.arm();
        hook.dispatch(&frame, TraceEvent::Line);
        assert_eq!(footprint.step_counter(), 1);
        assert_eq!(footprint.len(), 1);
    }

    #[test]
    fn test_suppression_counts_steps_but_records_nothing() {
        let (footprint, hook, context) = tracer_for("<ipython-input-1>", "x");
        let frame = SimFrame::new("<ipython-input-1>", "f", 1).with_local("x", Value::Int(5));

        {
            let _guard = context.suppression().guard();
            hook.dispatch(&frame, TraceEvent::Line);
            hook.dispatch(&frame, TraceEvent::Call);
        }
        assert_eq!(footprint.step_counter(), 2);
        assert!(footprint.is_empty());
        assert!(footprint.with(|fp| fp.calls().is_empty()));

        hook.dispatch(&frame, TraceEvent::Line);
        assert_eq!(footprint.len(), 1);
    }

    #[test]
    fn test_pending_cleared_on_disarm() {
        let (_footprint, hook, _context) = tracer_for("<ipython-input-1>", "y = 2");
        let frame = SimFrame::new("<ipython-input-1>", "f", 1);
        hook.dispatch(&frame, TraceEvent::Line);
        assert_eq!(hook.pending_assignments(), 1);
        hook.disarm();
        assert_eq!(hook.pending_assignments(), 0);
    }

    #[test]
    fn test_suppressed_return_releases_pending_targets() {
        let (footprint, hook, context) = tracer_for("<ipython-input-1>", "x = 1");
        let frames: Vec<SimFrame> = (0..3)
            .map(|_| SimFrame::new("<ipython-input-1>", "f", 1))
            .collect();
        for frame in &frames {
            hook.dispatch(frame, TraceEvent::Line);
        }
        assert_eq!(hook.pending_assignments(), 3);

        let _guard = context.suppression().guard();
        for frame in &frames {
            frame.set_local("x", Value::Int(1));
            hook.dispatch(frame, TraceEvent::Return(&Value::None));
        }
        assert_eq!(hook.pending_assignments(), 0);
        assert!(footprint.is_empty());
    }

    #[test]
    fn test_take_leaves_empty_footprint() {
        let (footprint, hook, _context) = tracer_for("<ipython-input-1>", "x");
        let frame = SimFrame::new("<ipython-input-1>", "f", 1).with_local("x", Value::Int(5));
        hook.dispatch(&frame, TraceEvent::Line);

        let taken = footprint.take();
        assert_eq!(taken.len(), 1);
        assert!(footprint.is_empty());
    }
}
