//! Suspension controller
//!
//! Lets traced code exclude a region from observation (demo code, ungraded
//! scratch work) and switch observation back on afterwards. Both operations
//! act on the nearest enclosing traced stack, found by walking outward from
//! the calling frame to the first frame flagged tracing-active. Outside a
//! traced stack they do nothing.
//!
//! ```text
//! x2 = power(x, 2)      # traced
//! suspend()
//! x3 = power(x, 3)      # not traced
//! resume()
//! x4 = power(x, 4)      # traced
//! ```

use crate::context::TracingContext;
use crate::host::{tracing_frame, Frame, HookRegistry};

/// Detach the hook from the traced stack enclosing `from`
///
/// Returns `true` if a hook was detached and remembered in `context`.
pub fn suspend<R>(context: &TracingContext, registry: &mut R, from: &dyn Frame) -> bool
where
    R: HookRegistry + ?Sized,
{
    let Some(frame) = tracing_frame(from) else {
        tracing::debug!("suspend outside a traced stack ignored");
        return false;
    };
    let Some(hook) = registry.installed(frame) else {
        tracing::debug!(stack = frame.stack().0, "suspend with no hook installed ignored");
        return false;
    };

    context.remember(hook);
    registry.install(frame, None);
    tracing::debug!(stack = frame.stack().0, routine = frame.routine(), "tracing suspended");
    true
}

/// Reinstall the hook remembered by [`suspend`] on the traced stack enclosing `from`
///
/// Returns `true` if a hook was reinstalled.
pub fn resume<R>(context: &TracingContext, registry: &mut R, from: &dyn Frame) -> bool
where
    R: HookRegistry + ?Sized,
{
    let Some(frame) = tracing_frame(from) else {
        tracing::debug!("resume outside a traced stack ignored");
        return false;
    };
    let Some(hook) = context.take_remembered() else {
        tracing::debug!(stack = frame.stack().0, "resume with nothing suspended ignored");
        return false;
    };

    registry.install(frame, Some(hook));
    tracing::debug!(stack = frame.stack().0, routine = frame.routine(), "tracing resumed");
    true
}

/// Run `body` with tracing suspended, resuming afterwards
///
/// Resumes only if this call did the suspending, so nesting inside an
/// already-suspended region leaves it suspended.
pub fn without_tracing<R, T>(
    context: &TracingContext,
    registry: &mut R,
    from: &dyn Frame,
    body: impl FnOnce(&mut R) -> T,
) -> T
where
    R: HookRegistry + ?Sized,
{
    let suspended = suspend(context, &mut *registry, from);
    let out = body(&mut *registry);
    if suspended {
        resume(context, &mut *registry, from);
    }
    out
}
