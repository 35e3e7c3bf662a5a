//! Rendering of wire lines.
//!
//! A wire line has the shape
//! `[ "<deviceId>| " ] [ "<colour><L> (<ms>) " ] <body> [ "<reset>\n" ]`.
//! The level/timestamp section is only added for messages that do not
//! already carry host-rendered metadata.

use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use crate::identity::DeviceIdentity;
use crate::log_message::LogMessage;
use crate::severity::{COLOR_RESET, Severity};

/// Default upper bound on the body of a single line, in bytes.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1024;

const DEVICE_ID_SEPARATOR: &str = "| ";

/// Errors raised while rendering a line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The output buffer could not be allocated.
    #[error("out of memory while rendering a {requested} byte log line")]
    OutOfMemory { requested: usize },
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Cut `body` to at most `max_len` bytes without splitting a character.
pub fn truncate_body(body: &str, max_len: usize) -> &str {
    if body.len() <= max_len {
        return body;
    }
    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Render a line into a freshly allocated, exactly sized buffer.
///
/// `device_id` is prepended when present. `level` adds the coloured severity
/// letter and timestamp plus the trailing reset and newline.
pub fn render_line(
    device_id: Option<&str>,
    level: Option<(Severity, u64)>,
    body: &str,
) -> Result<LogMessage, FormatError> {
    let mut needed = body.len();
    if let Some(id) = device_id {
        needed += id.len() + DEVICE_ID_SEPARATOR.len();
    }
    if let Some((severity, timestamp)) = level {
        // "<colour>L (" + digits + ") " ... "<reset>\n"
        needed += severity.color().len() + 3 + decimal_len(timestamp) + 2;
        needed += COLOR_RESET.len() + 1;
    }

    let mut out = String::new();
    out.try_reserve_exact(needed)
        .map_err(|_| FormatError::OutOfMemory { requested: needed })?;

    if let Some(id) = device_id {
        out.push_str(id);
        out.push_str(DEVICE_ID_SEPARATOR);
    }
    if let Some((severity, timestamp)) = level {
        let _ = write!(
            out,
            "{}{} ({}) ",
            severity.color(),
            severity.letter(),
            timestamp
        );
    }
    out.push_str(body);
    if level.is_some() {
        out.push_str(COLOR_RESET);
        out.push('\n');
    }
    Ok(LogMessage::from(out))
}

/// Formatter bound to a device identity and a body length limit.
#[derive(Clone, Debug)]
pub struct MessageFormatter {
    identity: Arc<DeviceIdentity>,
    max_message_len: usize,
}

impl MessageFormatter {
    pub fn new(identity: Arc<DeviceIdentity>, max_message_len: usize) -> Self {
        Self {
            identity,
            max_message_len,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Render `body` into a wire line.
    ///
    /// The device identity is computed on first use when
    /// `include_device_id` is set.
    pub fn render(
        &self,
        include_device_id: bool,
        include_level_and_timestamp: bool,
        severity: Severity,
        timestamp_millis: u64,
        body: &str,
    ) -> Result<LogMessage, FormatError> {
        let device_id = include_device_id.then(|| self.identity.get());
        let level = include_level_and_timestamp.then_some((severity, timestamp_millis));
        render_line(device_id, level, truncate_body(body, self.max_message_len))
    }
}
