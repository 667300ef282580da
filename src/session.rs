//! Start/stop tracing around a region of code
//!
//! A [`TraceSession`] is the contract the execution orchestrator uses: start
//! before running the target code, end afterwards, and take the footprint.

use crate::context::TracingContext;
use crate::footprint::Footprint;
use crate::hook::{FootprintHandle, HookHandle, TracerBuilder};
use crate::host::{tracing_frame, Frame, HookRegistry};

/// One traced region
#[derive(Debug, Default)]
pub struct TraceSession {
    footprint: Option<FootprintHandle>,
    hook: Option<HookHandle>,
}

impl TraceSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracing the stack `frame` belongs to
    ///
    /// Returns `false` and does nothing if `frame` is already inside a traced
    /// stack (the enclosing trace keeps observing) or this session has
    /// already started.
    pub fn start<R>(
        &mut self,
        builder: TracerBuilder,
        context: &TracingContext,
        registry: &mut R,
        frame: &dyn Frame,
    ) -> bool
    where
        R: HookRegistry + ?Sized,
    {
        if self.hook.is_some() || tracing_frame(frame).is_some() {
            tracing::debug!(routine = frame.routine(), "already tracing, session not started");
            return false;
        }

        let (footprint, hook) = builder.build(context);
        frame.set_tracing_active(true);
        registry.install(frame, Some(hook.clone()));
        tracing::debug!(
            stack = frame.stack().0,
            origin = frame.origin(),
            "trace session started"
        );

        self.footprint = Some(footprint);
        self.hook = Some(hook);
        true
    }

    /// Stop tracing and hand over the finished footprint
    ///
    /// `frame` must be the frame passed to [`TraceSession::start`]. Returns
    /// `None` if this session never started.
    pub fn end<R>(
        &mut self,
        context: &TracingContext,
        registry: &mut R,
        frame: &dyn Frame,
    ) -> Option<Footprint>
    where
        R: HookRegistry + ?Sized,
    {
        let hook = self.hook.take()?;
        registry.install(frame, None);
        frame.set_tracing_active(false);
        hook.disarm();
        context.forget(&hook);

        let footprint = self.footprint.take()?.take();
        tracing::debug!(
            values = footprint.len(),
            steps = footprint.step_counter(),
            "trace session ended"
        );
        Some(footprint)
    }

    pub fn is_active(&self) -> bool {
        self.hook.is_some()
    }

    /// Live view of the footprint while the session runs
    pub fn footprint(&self) -> Option<&FootprintHandle> {
        self.footprint.as_ref()
    }

    pub fn hook(&self) -> Option<&HookHandle> {
        self.hook.as_ref()
    }
}
