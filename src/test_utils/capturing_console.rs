//! Console sink that keeps every echoed line in memory.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::interceptor::ConsoleSink;

/// Console sink storing everything written to it for later inspection.
#[derive(Clone, Debug, Default)]
pub struct CapturingConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of the lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl ConsoleSink for CapturingConsole {
    fn echo(&self, line: fmt::Arguments<'_>) {
        self.lines.lock().push(line.to_string());
    }
}
