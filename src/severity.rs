//! Severity levels carried on the wire.
//!
//! The collector expects the single-letter codes used by embedded loggers
//! (`E W I D V`), so this enum is kept apart from `log::Level`.

/// ANSI escape that restores the default foreground colour.
pub const COLOR_RESET: &str = "\x1b[39m";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Verbose = 4,
}

impl Severity {
    const ORDERED: [Severity; 5] = [
        Severity::Error,
        Severity::Warn,
        Severity::Info,
        Severity::Debug,
        Severity::Verbose,
    ];

    /// Map a raw severity code onto the cycle `E W I D V`.
    pub fn from_code(code: u8) -> Self {
        Self::ORDERED[usize::from(code % 5)]
    }

    pub fn letter(self) -> char {
        match self {
            Severity::Error => 'E',
            Severity::Warn => 'W',
            Severity::Info => 'I',
            Severity::Debug => 'D',
            Severity::Verbose => 'V',
        }
    }

    /// ANSI colour escape used in front of the severity letter.
    pub fn color(self) -> &'static str {
        match self {
            Severity::Error => "\x1b[31m",
            Severity::Warn => "\x1b[33m",
            Severity::Info => "\x1b[32m",
            Severity::Debug | Severity::Verbose => COLOR_RESET,
        }
    }
}

impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Severity::Error,
            log::Level::Warn => Severity::Warn,
            log::Level::Info => Severity::Info,
            log::Level::Debug => Severity::Debug,
            log::Level::Trace => Severity::Verbose,
        }
    }
}
