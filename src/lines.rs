//! Source line lookup
//!
//! The hook engine needs the raw text of the line a frame is executing.
//! Interactive cells have no file on disk, so their source is registered by
//! whoever feeds cells to the runtime; everything else is read lazily from
//! disk and cached for the life of the tracer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// Provides the text of a given line of a given origin
pub trait LineSource {
    /// Text of `line_no` (1-indexed) in `origin`, without its line terminator
    fn line(&mut self, origin: &str, line_no: u32) -> Option<Rc<str>>;
}

/// Registered cells plus a lazily filled file cache
#[derive(Debug, Default)]
pub struct LineCache {
    cells: HashMap<String, Vec<Rc<str>>>,
    /// `None` caches a failed load so the file is not retried on every event
    files: HashMap<String, Option<Vec<Rc<str>>>>,
}

impl LineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the source of an in-memory origin, replacing any earlier one
    pub fn register(&mut self, origin: impl Into<String>, source: &str) {
        self.cells.insert(origin.into(), split_lines(source));
    }

    /// Forget a cached file so it is re-read on next access
    pub fn invalidate(&mut self, origin: &str) {
        self.files.remove(origin);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.files.clear();
    }

    /// Wrap for sharing between the tracer and whoever registers cells
    pub fn shared(self) -> Rc<RefCell<LineCache>> {
        Rc::new(RefCell::new(self))
    }

    fn load(origin: &str) -> Option<Vec<Rc<str>>> {
        match std::fs::read_to_string(Path::new(origin)) {
            Ok(text) => Some(split_lines(&text)),
            Err(err) => {
                tracing::trace!(origin, %err, "source unavailable");
                None
            }
        }
    }
}

fn split_lines(source: &str) -> Vec<Rc<str>> {
    source.lines().map(Rc::from).collect()
}

impl LineSource for LineCache {
    fn line(&mut self, origin: &str, line_no: u32) -> Option<Rc<str>> {
        let index = (line_no as usize).checked_sub(1)?;
        let lines = match self.cells.get(origin) {
            Some(lines) => lines,
            None => self
                .files
                .entry(origin.to_string())
                .or_insert_with(|| Self::load(origin))
                .as_ref()?,
        };
        lines.get(index).cloned()
    }
}

impl LineSource for Rc<RefCell<LineCache>> {
    fn line(&mut self, origin: &str, line_no: u32) -> Option<Rc<str>> {
        self.try_borrow_mut().ok()?.line(origin, line_no)
    }
}
