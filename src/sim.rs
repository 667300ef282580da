//! In-memory reference host
//!
//! A minimal host runtime for driving the tracer without a real interpreter:
//! frames with explicit locals and globals, dotted-path evaluation over the
//! [`Value`] model, and a hook registry keyed by stack. Embedders use it to
//! test their own event plumbing; the crate's tests and benches use it to
//! replay executions.
//!
//! ```
//! use huella::context::TracingContext;
//! use huella::hook::TracerBuilder;
//! use huella::host::HookRegistry;
//! use huella::lines::LineCache;
//! use huella::sim::{SimFrame, SimRuntime};
//! use huella::value::Value;
//!
//! let mut lines = LineCache::new();
//! lines.register("<ipython-input-1>", "total = price * 2");
//! let context = TracingContext::new();
//! let (footprint, hook) = TracerBuilder::default().with_line_source(lines).build(&context);
//!
//! let mut runtime = SimRuntime::new();
//! let frame = SimFrame::new("<ipython-input-1>", "<module>", 1).with_local("price", Value::Int(21));
//! runtime.install(&frame, Some(hook));
//!
//! runtime.line(&frame, 1);
//! frame.set_local("total", Value::Int(42));
//! runtime.ret(&frame, &Value::None);
//!
//! let recorded: Vec<(Value, u64)> =
//!     footprint.with(|fp| fp.iter().map(|o| (o.snapshot().clone(), o.step())).collect());
//! assert_eq!(
//!     recorded,
//!     vec![(Value::Int(21), 1), (Value::Int(42), 1), (Value::None, 2)]
//! );
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EvalError;
use crate::extract::is_identifier;
use crate::hook::HookHandle;
use crate::host::{ActivationId, Frame, HookRegistry, ScopeResolver, StackId, TraceEvent};
use crate::value::Value;

static NEXT_ACTIVATION: AtomicU64 = AtomicU64::new(1);

/// Module-level namespace shared by every frame running code from that module
#[derive(Debug, Default)]
pub struct SimGlobals {
    vars: RefCell<BTreeMap<String, Value>>,
    tracing_active: Cell<bool>,
}

impl SimGlobals {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().remove(name)
    }
}

/// Locals over shared globals
#[derive(Debug)]
pub struct MapScope {
    locals: RefCell<BTreeMap<String, Value>>,
    globals: Rc<SimGlobals>,
}

impl MapScope {
    pub fn new(globals: Rc<SimGlobals>) -> Self {
        Self {
            locals: RefCell::new(BTreeMap::new()),
            globals,
        }
    }

    pub fn set_local(&self, name: &str, value: Value) {
        self.locals.borrow_mut().insert(name.to_string(), value);
    }

    pub fn remove_local(&self, name: &str) -> Option<Value> {
        self.locals.borrow_mut().remove(name)
    }

    pub fn globals(&self) -> &Rc<SimGlobals> {
        &self.globals
    }
}

impl ScopeResolver for MapScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.locals
            .borrow()
            .get(name)
            .cloned()
            .or_else(|| self.globals.get(name))
    }

    fn evaluate(&self, expr: &str) -> Result<Value, EvalError> {
        let mut segments = expr.split('.');
        let head = segments
            .next()
            .filter(|head| is_identifier(head))
            .ok_or_else(|| EvalError::Syntax(expr.to_string()))?;
        let mut value = self
            .lookup(head)
            .ok_or_else(|| EvalError::Unbound(head.to_string()))?;
        for attribute in segments {
            if !is_identifier(attribute) {
                return Err(EvalError::Syntax(expr.to_string()));
            }
            value = value.attribute(attribute)?;
        }
        Ok(value)
    }
}

/// A call frame with explicit bindings
pub struct SimFrame<'a> {
    origin: String,
    routine: String,
    line: Cell<u32>,
    activation: ActivationId,
    stack: StackId,
    caller: Option<&'a dyn Frame>,
    scope: MapScope,
}

impl<'a> SimFrame<'a> {
    /// New activation with its own fresh globals, on the default stack
    pub fn new(origin: &str, routine: &str, line: u32) -> Self {
        Self {
            origin: origin.to_string(),
            routine: routine.to_string(),
            line: Cell::new(line),
            activation: ActivationId(NEXT_ACTIVATION.fetch_add(1, Ordering::Relaxed)),
            stack: StackId::default(),
            caller: None,
            scope: MapScope::new(SimGlobals::new()),
        }
    }

    /// Called from `caller`, on the same stack
    pub fn with_caller(mut self, caller: &'a dyn Frame) -> Self {
        self.stack = caller.stack();
        self.caller = Some(caller);
        self
    }

    pub fn with_globals(mut self, globals: Rc<SimGlobals>) -> Self {
        self.scope.globals = globals;
        self
    }

    pub fn with_stack(mut self, stack: StackId) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_local(self, name: &str, value: Value) -> Self {
        self.scope.set_local(name, value);
        self
    }

    pub fn with_global(self, name: &str, value: Value) -> Self {
        self.scope.globals.set(name, value);
        self
    }

    pub fn set_local(&self, name: &str, value: Value) {
        self.scope.set_local(name, value);
    }

    pub fn remove_local(&self, name: &str) -> Option<Value> {
        self.scope.remove_local(name)
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.scope.globals.set(name, value);
    }

    pub fn set_line(&self, line: u32) {
        self.line.set(line);
    }

    pub fn globals(&self) -> &Rc<SimGlobals> {
        self.scope.globals()
    }
}

impl Frame for SimFrame<'_> {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn routine(&self) -> &str {
        &self.routine
    }

    fn line(&self) -> u32 {
        self.line.get()
    }

    fn activation(&self) -> ActivationId {
        self.activation
    }

    fn stack(&self) -> StackId {
        self.stack
    }

    fn caller(&self) -> Option<&dyn Frame> {
        self.caller
    }

    fn scope(&self) -> &dyn ScopeResolver {
        &self.scope
    }

    fn is_tracing_active(&self) -> bool {
        self.scope.globals.tracing_active.get()
    }

    fn set_tracing_active(&self, active: bool) {
        self.scope.globals.tracing_active.set(active);
    }
}

/// Hook registry with one slot per stack, plus helpers to fire events
#[derive(Debug, Default)]
pub struct SimRuntime {
    hooks: HashMap<StackId, HookHandle>,
}

impl SimRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `event` at the hook installed on `frame`'s stack, if any
    pub fn emit(&self, frame: &dyn Frame, event: TraceEvent<'_>) {
        if let Some(hook) = self.hooks.get(&frame.stack()) {
            hook.dispatch(frame, event);
        }
    }

    pub fn call(&self, frame: &dyn Frame) {
        self.emit(frame, TraceEvent::Call);
    }

    /// Move `frame` to `line` and fire a line event
    pub fn line(&self, frame: &SimFrame<'_>, line: u32) {
        frame.set_line(line);
        self.emit(frame, TraceEvent::Line);
    }

    pub fn ret(&self, frame: &dyn Frame, value: &Value) {
        self.emit(frame, TraceEvent::Return(value));
    }
}

impl HookRegistry for SimRuntime {
    fn installed(&self, frame: &dyn Frame) -> Option<HookHandle> {
        self.hooks.get(&frame.stack()).cloned()
    }

    fn install(&mut self, frame: &dyn Frame, hook: Option<HookHandle>) {
        match hook {
            Some(hook) => {
                self.hooks.insert(frame.stack(), hook);
            }
            None => {
                self.hooks.remove(&frame.stack());
            }
        }
    }
}
