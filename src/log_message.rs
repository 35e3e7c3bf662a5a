//! Rendered log line handed from producers to the shipping worker.

use std::fmt;

/// A fully rendered wire line.
///
/// Metadata is baked into the text before the message is enqueued. The value
/// is moved through the pipeline (producer, queue, worker) and never shared.
#[derive(Debug, PartialEq, Eq)]
pub struct LogMessage(String);

impl LogMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LogMessage {
    fn from(text: String) -> Self {
        Self(text)
    }
}
