//! Shipping macros that capture the call site.
//!
//! Each macro takes a target exposing `log_with_metadata` (a
//! [`LogShipper`](crate::LogShipper) or a [`LogInterceptor`](crate::LogInterceptor)),
//! a tag, and `format!`-style arguments. `line!()` and `module_path!()` are
//! captured at the call site and rendered as `"<tag> (<module>:<line>) <msg>"`.
//!
//! The macros are prefixed with `netlog_` to avoid collision with the `log`
//! crate's identically named macros.
//!
//! # Examples
//!
//! ```rust,ignore
//! let shipper = netlog::LogShipper::new();
//! netlog_info!(shipper, "wifi", "connected to {}", ssid);
//! netlog_error!(shipper, "ota", "image rejected");
//! ```

/// Ship a line at `Error` severity.
#[macro_export]
macro_rules! netlog_error {
    ($target:expr, $tag:expr, $($arg:tt)+) => {
        $crate::__netlog_impl!($target, $crate::Severity::Error, $tag, $($arg)+)
    };
}

/// Ship a line at `Warn` severity.
#[macro_export]
macro_rules! netlog_warn {
    ($target:expr, $tag:expr, $($arg:tt)+) => {
        $crate::__netlog_impl!($target, $crate::Severity::Warn, $tag, $($arg)+)
    };
}

/// Ship a line at `Info` severity.
///
/// ```rust,ignore
/// netlog_info!(shipper, "app", "boot took {} ms", elapsed);
/// ```
#[macro_export]
macro_rules! netlog_info {
    ($target:expr, $tag:expr, $($arg:tt)+) => {
        $crate::__netlog_impl!($target, $crate::Severity::Info, $tag, $($arg)+)
    };
}

/// Ship a line at `Debug` severity.
#[macro_export]
macro_rules! netlog_debug {
    ($target:expr, $tag:expr, $($arg:tt)+) => {
        $crate::__netlog_impl!($target, $crate::Severity::Debug, $tag, $($arg)+)
    };
}

/// Ship a line at `Verbose` severity.
#[macro_export]
macro_rules! netlog_verbose {
    ($target:expr, $tag:expr, $($arg:tt)+) => {
        $crate::__netlog_impl!($target, $crate::Severity::Verbose, $tag, $($arg)+)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __netlog_impl {
    ($target:expr, $severity:expr, $tag:expr, $($arg:tt)+) => {
        $target.log_with_metadata(
            $severity,
            $tag,
            ::std::line!(),
            ::std::module_path!(),
            ::std::format_args!($($arg)+),
        )
    };
}
