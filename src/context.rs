//! Per-stack tracing context
//!
//! Holds the two pieces of mutable state the tracer shares with code outside
//! the hook: the suppression switch (flipped by a cost/complexity analyzer
//! to blanket-disable recording) and the slot that remembers a suspended
//! hook until it is resumed.
//!
//! A context belongs to one traced call stack. Both fields use `Rc`/`Cell`,
//! so a context can never be shared across threads; running several traced
//! stacks at once means one context per stack.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::hook::HookHandle;

/// Shared on/off switch for recording
///
/// While suppressed the hook keeps counting steps but records nothing.
#[derive(Debug, Clone, Default)]
pub struct SuppressionSwitch(Rc<Cell<bool>>);

impl SuppressionSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppress(&self) {
        self.0.set(true);
    }

    pub fn release(&self) {
        self.0.set(false);
    }

    #[inline]
    pub fn is_suppressed(&self) -> bool {
        self.0.get()
    }

    /// Suppress until the returned guard is dropped
    ///
    /// Nested guards restore whatever state was in effect when they were taken.
    pub fn guard(&self) -> SuppressionGuard {
        let previous = self.0.replace(true);
        SuppressionGuard {
            switch: self.clone(),
            previous,
        }
    }
}

/// Restores the suppression state on drop
#[derive(Debug)]
pub struct SuppressionGuard {
    switch: SuppressionSwitch,
    previous: bool,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.switch.0.set(self.previous);
    }
}

/// State shared by the hook, the suspension controller and the session
#[derive(Debug, Default)]
pub struct TracingContext {
    suppression: SuppressionSwitch,
    remembered: RefCell<Option<HookHandle>>,
}

impl TracingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppression(&self) -> &SuppressionSwitch {
        &self.suppression
    }

    /// Whether a suspended hook is waiting to be resumed
    pub fn has_suspended_hook(&self) -> bool {
        self.remembered.borrow().is_some()
    }

    pub(crate) fn remember(&self, hook: HookHandle) {
        self.remembered.replace(Some(hook));
    }

    pub(crate) fn take_remembered(&self) -> Option<HookHandle> {
        self.remembered.take()
    }

    /// Forget the remembered hook if it is `hook`
    pub(crate) fn forget(&self, hook: &HookHandle) {
        let mut slot = self.remembered.borrow_mut();
        if slot.as_ref().is_some_and(|h| h.ptr_eq(hook)) {
            *slot = None;
        }
    }
}
