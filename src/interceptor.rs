//! Producer-side entry points of the pipeline.
//!
//! [`LogInterceptor`] turns log statements into wire lines and hands them to
//! the [`ShippingQueue`]. It has two entry points:
//!
//! - [`LogInterceptor::log_with_metadata`] for explicit calls (see the
//!   `netlog_*!` macros), which always render severity and timestamp.
//! - [`LogInterceptor::route_system_log`] for the process-wide `log` hook,
//!   which echoes every line locally and ships it only when shipping is
//!   enabled, the thread is not already on the shipping path, and the
//!   caller is not in interrupt context.
//!
//! Interrupt-context enqueue is refused on both paths: the interceptor asks
//! its [`ContextProbe`] before touching the queue.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::formatter::{FormatError, MessageFormatter};
use crate::identity::DeviceIdentity;
use crate::log_message::LogMessage;
use crate::queue::{EnqueueError, ShippingQueue};
use crate::rate_limited_warner::RateLimitedWarner;
use crate::severity::{COLOR_RESET, Severity};
use crate::shipping_path;
use crate::toggle::SendingToggle;

/// Reports whether the caller runs in interrupt or exception context.
pub trait ContextProbe: Send + Sync {
    fn in_interrupt_context(&self) -> bool;
}

/// Probe for hosted platforms, where log calls never run in interrupt context.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInterrupts;

impl ContextProbe for NoInterrupts {
    fn in_interrupt_context(&self) -> bool {
        false
    }
}

impl<F> ContextProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn in_interrupt_context(&self) -> bool {
        self()
    }
}

/// Local output for host-rendered lines.
///
/// Lines arrive as unrendered [`fmt::Arguments`] so sinks that write
/// straight to a device never need an intermediate buffer.
pub trait ConsoleSink: Send + Sync {
    fn echo(&self, line: fmt::Arguments<'_>);
}

/// Writes host-rendered lines to standard error.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrConsole;

impl ConsoleSink for StderrConsole {
    fn echo(&self, line: fmt::Arguments<'_>) {
        let _ = io::stderr().lock().write_fmt(line);
    }
}

/// Why a line was not shipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterceptError {
    #[error("network shipping is disabled")]
    Disabled,
    #[error("refusing to enqueue from interrupt context")]
    InterruptContext,
    #[error("line originated on the shipping path")]
    Reentrant,
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
}

struct Pipeline {
    queue: Arc<ShippingQueue>,
    formatter: MessageFormatter,
    include_device_id: bool,
    drop_warner: RateLimitedWarner,
}

/// Routes log statements into the shipping queue.
pub struct LogInterceptor {
    toggle: SendingToggle,
    identity: Arc<DeviceIdentity>,
    pipeline: OnceCell<Pipeline>,
    console: Box<dyn ConsoleSink>,
    probe: Box<dyn ContextProbe>,
    epoch: Instant,
}

impl LogInterceptor {
    pub fn new(
        identity: Arc<DeviceIdentity>,
        console: impl ConsoleSink + 'static,
        probe: impl ContextProbe + 'static,
    ) -> Self {
        Self {
            toggle: SendingToggle::default(),
            identity,
            pipeline: OnceCell::new(),
            console: Box::new(console),
            probe: Box::new(probe),
            epoch: Instant::now(),
        }
    }

    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    /// Connect the interceptor to a started queue.
    ///
    /// Returns `false` if a queue was already attached.
    pub fn attach(
        &self,
        queue: Arc<ShippingQueue>,
        max_message_len: usize,
        include_device_id: bool,
        warn_interval: Duration,
    ) -> bool {
        let pipeline = Pipeline {
            queue,
            formatter: MessageFormatter::new(Arc::clone(&self.identity), max_message_len),
            include_device_id,
            drop_warner: RateLimitedWarner::new(warn_interval),
        };
        self.pipeline.set(pipeline).is_ok()
    }

    pub fn is_attached(&self) -> bool {
        self.pipeline.get().is_some()
    }

    pub fn set_sending_enabled(&self, enabled: bool) {
        self.toggle.set(enabled);
        warn!(
            "netlog network shipping {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn is_sending_enabled(&self) -> bool {
        self.toggle.is_enabled()
    }

    /// Milliseconds since the interceptor was created.
    pub fn timestamp_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
    }

    /// Ship a fully rendered line built from call-site metadata.
    ///
    /// The body is `"<tag> (<func>:<line>) <args>"`. Nothing is echoed
    /// locally.
    pub fn log_with_metadata(
        &self,
        severity: Severity,
        tag: &str,
        line: u32,
        func: &str,
        args: fmt::Arguments<'_>,
    ) -> Result<(), InterceptError> {
        if !self.toggle.is_enabled() {
            return Err(InterceptError::Disabled);
        }
        if self.probe.in_interrupt_context() {
            return Err(InterceptError::InterruptContext);
        }
        let pipeline = self.pipeline()?;
        let _guard = shipping_path::enter();
        let body = format!("{tag} ({func}:{line}) {args}");
        let msg = pipeline.formatter.render(
            pipeline.include_device_id,
            true,
            severity,
            self.timestamp_millis(),
            &body,
        )?;
        Self::enqueue(pipeline, msg)
    }

    /// Handle one record from the process-wide hook.
    ///
    /// The host text `"<colour><L> (<ms>) <target>: <args><reset>\n"` is
    /// always written to the console, whether or not it was shipped. Nothing
    /// is allocated unless the line is actually shipped.
    pub fn route_system_log(
        &self,
        severity: Severity,
        target: &str,
        args: fmt::Arguments<'_>,
    ) -> Result<(), InterceptError> {
        let timestamp = self.timestamp_millis();
        let outcome = self.ship_hook_record(severity, timestamp, target, args);
        self.console.echo(format_args!(
            "{}{} ({}) {}: {}{}\n",
            severity.color(),
            severity.letter(),
            timestamp,
            target,
            args,
            COLOR_RESET
        ));
        outcome
    }

    fn ship_hook_record(
        &self,
        severity: Severity,
        timestamp: u64,
        target: &str,
        args: fmt::Arguments<'_>,
    ) -> Result<(), InterceptError> {
        if self.probe.in_interrupt_context() {
            return Err(InterceptError::InterruptContext);
        }
        if shipping_path::is_active() {
            return Err(InterceptError::Reentrant);
        }
        if !self.toggle.is_enabled() {
            return Err(InterceptError::Disabled);
        }
        let pipeline = self.pipeline()?;
        let _guard = shipping_path::enter();
        // Shipped bytes equal the device prefix plus the echoed host text,
        // with only the `<target>: <args>` body subject to the length cap.
        let body = format!("{target}: {args}");
        let msg = pipeline.formatter.render(
            pipeline.include_device_id,
            true,
            severity,
            timestamp,
            &body,
        )?;
        Self::enqueue(pipeline, msg)
    }

    fn pipeline(&self) -> Result<&Pipeline, EnqueueError> {
        self.pipeline.get().ok_or(EnqueueError::NotStarted)
    }

    fn enqueue(pipeline: &Pipeline, msg: LogMessage) -> Result<(), InterceptError> {
        match pipeline.queue.enqueue(msg) {
            Ok(()) => Ok(()),
            Err(EnqueueError::QueueFull) => {
                pipeline.drop_warner.record_drop();
                pipeline.drop_warner.warn_if_due(|count| {
                    warn!("netlog shipping queue full; dropped {count} lines");
                });
                Err(EnqueueError::QueueFull.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl fmt::Debug for LogInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogInterceptor")
            .field("sending_enabled", &self.is_sending_enabled())
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FixedAddress;
    use crate::queue::Dequeue;
    use crate::test_utils::CapturingConsole;
    use rstest::{fixture, rstest};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const ID: &str = "02:00:00:00:00:01";

    struct Harness {
        interceptor: LogInterceptor,
        queue: Arc<ShippingQueue>,
        console: CapturingConsole,
    }

    impl Harness {
        fn with_probe(capacity: usize, probe: impl ContextProbe + 'static) -> Self {
            let identity = Arc::new(DeviceIdentity::new(FixedAddress([2, 0, 0, 0, 0, 1])));
            let console = CapturingConsole::new();
            let interceptor = LogInterceptor::new(identity, console.clone(), probe);
            let queue = Arc::new(ShippingQueue::new(capacity));
            assert!(interceptor.attach(Arc::clone(&queue), 1024, true, Duration::from_secs(5)));
            Self {
                interceptor,
                queue,
                console,
            }
        }

        fn queued(&self) -> Vec<String> {
            let mut out = Vec::new();
            while let Dequeue::Message(m) = self.queue.dequeue(Duration::from_millis(1)) {
                out.push(m.into_string());
            }
            out
        }
    }

    #[fixture]
    fn harness() -> Harness {
        Harness::with_probe(8, NoInterrupts)
    }

    #[rstest]
    fn explicit_call_renders_metadata(harness: Harness) {
        harness
            .interceptor
            .log_with_metadata(Severity::Warn, "wifi", 42, "connect", format_args!("rssi {}", -70))
            .expect("enqueued");
        let lines = harness.queued();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.starts_with(&format!("{ID}| \x1b[33mW (")), "{line:?}");
        assert!(line.ends_with(") wifi (connect:42) rssi -70\x1b[39m\n"), "{line:?}");
        assert!(harness.console.lines().is_empty());
    }

    #[rstest]
    fn hook_ships_with_device_id_only_and_echoes(harness: Harness) {
        harness
            .interceptor
            .route_system_log(Severity::Info, "app", format_args!("ready"))
            .expect("enqueued");
        let echoed = harness.console.lines();
        assert_eq!(echoed.len(), 1);
        assert!(echoed[0].starts_with("\x1b[32mI ("));
        assert!(echoed[0].ends_with(") app: ready\x1b[39m\n"));
        assert_eq!(harness.queued(), vec![format!("{ID}| {}", echoed[0])]);
    }

    #[rstest]
    fn hook_skips_network_inside_shipping_path(harness: Harness) {
        let _guard = shipping_path::enter();
        let outcome = harness
            .interceptor
            .route_system_log(Severity::Error, "net", format_args!("socket closed"));
        assert_eq!(outcome, Err(InterceptError::Reentrant));
        assert!(harness.queue.is_empty());
        assert_eq!(harness.console.lines().len(), 1);
    }

    #[rstest]
    fn interrupt_context_never_enqueues() {
        let in_isr = Arc::new(AtomicBool::new(true));
        let probe = {
            let in_isr = Arc::clone(&in_isr);
            move || in_isr.load(Ordering::SeqCst)
        };
        let harness = Harness::with_probe(8, probe);
        assert_eq!(
            harness
                .interceptor
                .route_system_log(Severity::Info, "isr", format_args!("tick")),
            Err(InterceptError::InterruptContext)
        );
        assert_eq!(
            harness
                .interceptor
                .log_with_metadata(Severity::Info, "isr", 1, "f", format_args!("tick")),
            Err(InterceptError::InterruptContext)
        );
        assert!(harness.queue.is_empty());
        assert_eq!(harness.console.lines().len(), 1);

        in_isr.store(false, Ordering::SeqCst);
        harness
            .interceptor
            .route_system_log(Severity::Info, "task", format_args!("tick"))
            .expect("enqueued");
        assert_eq!(harness.queue.len(), 1);
    }

    #[rstest]
    fn long_hook_line_keeps_terminator() {
        let identity = Arc::new(DeviceIdentity::new(FixedAddress([2, 0, 0, 0, 0, 1])));
        let console = CapturingConsole::new();
        let interceptor = LogInterceptor::new(identity, console.clone(), NoInterrupts);
        let queue = Arc::new(ShippingQueue::new(4));
        assert!(interceptor.attach(Arc::clone(&queue), 32, false, Duration::from_secs(5)));
        let long = "x".repeat(100);
        interceptor
            .route_system_log(Severity::Info, "app", format_args!("{long}"))
            .expect("enqueued");
        let Dequeue::Message(line) = queue.dequeue(Duration::from_millis(1)) else {
            panic!("expected a queued line");
        };
        let line = line.into_string();
        assert!(line.starts_with("\x1b[32mI ("), "{line:?}");
        assert!(line.ends_with(&format!(") app: {}\x1b[39m\n", "x".repeat(27))), "{line:?}");
        assert!(console.lines()[0].ends_with(&format!("{long}\x1b[39m\n")));
    }

    struct CountingDisplay(AtomicUsize);

    impl fmt::Display for CountingDisplay {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.fetch_add(1, Ordering::SeqCst);
            f.write_str("tick")
        }
    }

    #[rstest]
    #[case(true, 1)]
    #[case(false, 2)]
    fn interrupt_context_formats_only_for_console(
        #[case] in_isr: bool,
        #[case] renders: usize,
    ) {
        let harness = Harness::with_probe(8, move || in_isr);
        let arg = CountingDisplay(AtomicUsize::new(0));
        let _ = harness
            .interceptor
            .route_system_log(Severity::Warn, "isr", format_args!("{arg}"));
        assert_eq!(arg.0.load(Ordering::SeqCst), renders);
        assert_eq!(harness.queue.len(), usize::from(!in_isr));
        let echoed = harness.console.lines();
        assert_eq!(echoed.len(), 1);
        assert!(echoed[0].starts_with("\x1b[33mW ("));
        assert!(echoed[0].ends_with(") isr: tick\x1b[39m\n"));
    }

    #[rstest]
    fn disabling_keeps_resident_lines(harness: Harness) {
        for i in 0..3 {
            harness
                .interceptor
                .log_with_metadata(Severity::Info, "t", 1, "f", format_args!("{i}"))
                .expect("enqueued");
        }
        harness.interceptor.set_sending_enabled(false);
        assert_eq!(
            harness
                .interceptor
                .log_with_metadata(Severity::Info, "t", 1, "f", format_args!("late")),
            Err(InterceptError::Disabled)
        );
        assert_eq!(
            harness
                .interceptor
                .route_system_log(Severity::Info, "t", format_args!("late")),
            Err(InterceptError::Disabled)
        );
        assert_eq!(harness.queue.len(), 3);
        assert_eq!(harness.console.lines().len(), 1);
    }

    #[rstest]
    fn full_queue_still_echoes() {
        let harness = Harness::with_probe(1, NoInterrupts);
        harness
            .interceptor
            .route_system_log(Severity::Info, "a", format_args!("one"))
            .expect("enqueued");
        assert_eq!(
            harness
                .interceptor
                .route_system_log(Severity::Info, "a", format_args!("two")),
            Err(InterceptError::Enqueue(EnqueueError::QueueFull))
        );
        assert_eq!(harness.console.lines().len(), 2);
        assert_eq!(harness.queue.dropped_count(), 1);
    }

    #[rstest]
    fn unattached_interceptor_reports_not_started() {
        let identity = Arc::new(DeviceIdentity::new(FixedAddress([0; 6])));
        let console = CapturingConsole::new();
        let interceptor = LogInterceptor::new(identity, console.clone(), NoInterrupts);
        assert_eq!(
            interceptor.route_system_log(Severity::Debug, "boot", format_args!("early")),
            Err(InterceptError::Enqueue(EnqueueError::NotStarted))
        );
        assert_eq!(console.lines().len(), 1);
        assert!(!interceptor.identity().is_cached());
    }

    #[rstest]
    fn second_attach_is_rejected(harness: Harness) {
        let other = Arc::new(ShippingQueue::new(1));
        assert!(!harness.interceptor.attach(other, 16, false, Duration::ZERO));
    }
}
