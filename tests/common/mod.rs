// Shared helpers for the integration tests
//
// Each test binary pulls in only what it needs.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use huella::config::{TraceOrigins, TracerConfig};
use huella::context::TracingContext;
use huella::footprint::Footprint;
use huella::hook::{FootprintHandle, HookHandle, TracerBuilder};
use huella::host::TraceEvent;
use huella::lines::LineSource;
use huella::sim::SimFrame;
use huella::value::Value;

/// Route `tracing` output to the test harness; set `RUST_LOG=huella=trace` to see it
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Line source that answers every lookup with the same scripted text
///
/// Stands in for the runtime's line cache when a test wants to feed the hook
/// one line at a time.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLine(Rc<RefCell<String>>);

impl ScriptedLine {
    pub fn new(text: &str) -> Self {
        let line = Self::default();
        line.set(text);
        line
    }

    pub fn set(&self, text: &str) {
        *self.0.borrow_mut() = text.to_string();
    }
}

impl LineSource for ScriptedLine {
    fn line(&mut self, _origin: &str, _line_no: u32) -> Option<Rc<str>> {
        Some(Rc::from(self.0.borrow().as_str()))
    }
}

/// Tracer over `lines`, tracing the interactive surface plus `files`
pub fn tracer(
    lines: impl LineSource + 'static,
    files: &[&str],
) -> (FootprintHandle, HookHandle, TracingContext) {
    init_logging();
    let origins =
        TraceOrigins::with_files(files.iter().copied()).expect("default patterns compile");
    let context = TracingContext::new();
    let (footprint, hook) = TracerBuilder::new(TracerConfig::default().with_origins(origins))
        .with_line_source(lines)
        .build(&context);
    (footprint, hook, context)
}

/// Footprint of a cell routine that returns each scripted value in turn
///
/// `advance` exception events pass before each return, so a value lands
/// `advance + 1` steps after the one before it.
pub fn footprint_of(script: &[(Value, u8)]) -> Footprint {
    let (footprint, hook, _context) = tracer(ScriptedLine::new(""), &[]);
    let frame = SimFrame::new("<ipython-input-1>", "f", 1);
    for (value, advance) in script {
        for _ in 0..*advance {
            hook.dispatch(&frame, TraceEvent::Exception);
        }
        hook.dispatch(&frame, TraceEvent::Return(value));
    }
    footprint.take()
}

/// Deterministic `rows x cols` array with distinct entries
pub fn grid(rows: usize, cols: usize, seed: f64) -> Value {
    let data: Vec<f64> = (0..rows * cols).map(|i| seed + i as f64 * 1.5 - 7.0).collect();
    Value::array(vec![rows, cols], data)
}

/// Apply `f` element-wise to an array value
pub fn map_array(value: &Value, f: impl Fn(f64) -> f64) -> Value {
    match value {
        Value::Array { shape, data } => {
            Value::array(shape.clone(), data.iter().map(|&x| f(x)).collect::<Vec<_>>())
        }
        other => panic!("expected an array, got {other:?}"),
    }
}

/// `(snapshot, step)` pairs in insertion order
pub fn records(footprint: &FootprintHandle) -> Vec<(Value, u64)> {
    footprint.with(|fp| {
        fp.iter()
            .map(|observed| (observed.snapshot().clone(), observed.step()))
            .collect()
    })
}
