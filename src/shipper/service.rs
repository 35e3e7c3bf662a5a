//! Service object owning the whole pipeline.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::warn;
use parking_lot::Mutex;
use thiserror::Error;

use crate::identity::DeviceIdentity;
use crate::interceptor::{
    ConsoleSink, ContextProbe, InterceptError, LogInterceptor, NoInterrupts, StderrConsole,
};
use crate::log_compat::{release_global_hook, route_global_hook};
use crate::queue::ShippingQueue;
use crate::severity::Severity;

use super::config::{ConfigError, ShipperConfig, ShipperConfigBuilder};
use super::session::TransportSession;
use super::transport::Transport;
use super::worker::ShippingWorker;

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "netlog-shipper";

/// Errors raised by [`LogShipper::start`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error("log shipping has already been started")]
    AlreadyStarted,
    #[error("no configuration has been stored")]
    NotConfigured,
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to spawn the shipping worker: {0}")]
    Spawn(#[source] io::Error),
}

struct Running {
    queue: Arc<ShippingQueue>,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: thread::JoinHandle<()>,
    hook_routed: bool,
    join_timeout: Duration,
}

/// Ships log lines to a remote collector.
///
/// Construct one per process, [`configure`](Self::configure) it, then
/// [`start`](Self::start) it. Starting is one-shot: after
/// [`shutdown`](Self::shutdown) the service cannot be restarted.
pub struct LogShipper {
    interceptor: Arc<LogInterceptor>,
    stored: Mutex<Option<ShipperConfig>>,
    running: Mutex<Option<Running>>,
}

impl Default for LogShipper {
    fn default() -> Self {
        Self::new()
    }
}

impl LogShipper {
    /// Service using the system hardware address, standard error for local
    /// echo, and no interrupt context.
    pub fn new() -> Self {
        Self::with_parts(DeviceIdentity::system(), StderrConsole, NoInterrupts)
    }

    pub fn with_parts(
        identity: DeviceIdentity,
        console: impl ConsoleSink + 'static,
        probe: impl ContextProbe + 'static,
    ) -> Self {
        Self {
            interceptor: Arc::new(LogInterceptor::new(Arc::new(identity), console, probe)),
            stored: Mutex::new(None),
            running: Mutex::new(None),
        }
    }

    /// Store a validated configuration for `host:port`.
    ///
    /// Returns `false` and keeps the previous configuration when `host` is
    /// empty or longer than 127 bytes, or `port` is zero.
    pub fn configure(&self, host: &str, port: u16, route_hook_to_network: bool) -> bool {
        match ShipperConfig::new(host, port, route_hook_to_network) {
            Ok(config) => {
                *self.stored.lock() = Some(config);
                true
            }
            Err(err) => {
                warn!("netlog rejected configuration: {err}");
                false
            }
        }
    }

    /// Store a fully tuned configuration.
    pub fn try_configure(&self, builder: &ShipperConfigBuilder) -> Result<(), ConfigError> {
        let config = builder.build()?;
        *self.stored.lock() = Some(config);
        Ok(())
    }

    /// The stored configuration, if any.
    pub fn config(&self) -> Option<ShipperConfig> {
        self.stored.lock().clone()
    }

    /// Start shipping with the stored configuration.
    pub fn start_configured(&self) -> Result<(), StartError> {
        let config = self.config().ok_or(StartError::NotConfigured)?;
        self.start(&config)
    }

    /// Create the queue, spawn the worker, and install the `log` hook if
    /// `config.route_hook_to_network` is set.
    ///
    /// Failing to install the hook (another logger owns it) is logged and
    /// does not fail the start.
    pub fn start(&self, config: &ShipperConfig) -> Result<(), StartError> {
        config.validate()?;
        let transport = config
            .transport
            .build(config.connect_timeout, config.write_timeout);
        self.start_with_transport(config, transport)
    }

    /// Like [`start`](Self::start) with a caller-supplied transport.
    pub fn start_with_transport(
        &self,
        config: &ShipperConfig,
        transport: Box<dyn Transport>,
    ) -> Result<(), StartError> {
        let mut running = self.running.lock();
        if running.is_some() || self.interceptor.is_attached() {
            return Err(StartError::AlreadyStarted);
        }
        config.validate()?;

        let join_timeout = config
            .connect_timeout
            .saturating_add(config.write_timeout)
            .saturating_add(config.dequeue_timeout);
        let queue = Arc::new(ShippingQueue::new(config.capacity));
        let session = TransportSession::new(transport, config.host.clone(), config.port);
        let worker = ShippingWorker::new(session, Arc::clone(&queue), config);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                worker.run(stop_rx);
                let _ = done_tx.send(());
            })
            .map_err(StartError::Spawn)?;

        self.interceptor.attach(
            Arc::clone(&queue),
            config.max_message_len,
            config.include_device_id,
            config.warn_interval,
        );

        let hook_routed = config.route_hook_to_network
            && route_global_hook(Arc::clone(&self.interceptor), config.hook_level);
        if config.route_hook_to_network && !hook_routed {
            warn!("netlog could not install the log hook; another logger is already set");
        }

        *running = Some(Running {
            queue,
            stop_tx,
            done_rx,
            handle,
            hook_routed,
            join_timeout,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn interceptor(&self) -> &Arc<LogInterceptor> {
        &self.interceptor
    }

    /// The device identity string, read from the hardware on first use.
    pub fn device_id(&self) -> &str {
        self.interceptor.identity().get()
    }

    pub fn set_sending_enabled(&self, enabled: bool) {
        self.interceptor.set_sending_enabled(enabled);
    }

    pub fn is_sending_enabled(&self) -> bool {
        self.interceptor.is_sending_enabled()
    }

    /// Ship a line with call-site metadata. See the `netlog_*!` macros.
    pub fn log_with_metadata(
        &self,
        severity: Severity,
        tag: &str,
        line: u32,
        func: &str,
        args: fmt::Arguments<'_>,
    ) -> Result<(), InterceptError> {
        self.interceptor.log_with_metadata(severity, tag, line, func, args)
    }

    /// Lines dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.running
            .lock()
            .as_ref()
            .map_or(0, |running| running.queue.dropped_count())
    }

    pub fn queue_len(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map_or(0, |running| running.queue.len())
    }

    /// Wait until the worker has taken every queued line.
    ///
    /// Returns `false` when not running or when `timeout` elapses first.
    pub fn flush(&self, timeout: Duration) -> bool {
        let Some(queue) = self
            .running
            .lock()
            .as_ref()
            .map(|running| Arc::clone(&running.queue))
        else {
            return false;
        };
        queue.wait_until_drained(timeout)
    }

    /// Stop the worker, waiting at most the connect, write and dequeue
    /// timeouts combined.
    pub fn shutdown(&self) -> bool {
        let timeout = self
            .running
            .lock()
            .as_ref()
            .map_or(Duration::ZERO, |running| running.join_timeout);
        self.shutdown_within(timeout)
    }

    /// Stop the worker, waiting at most `timeout` for it to exit.
    ///
    /// Lines still queued are sent while the collector accepts them. Returns
    /// `true` once the worker has exited.
    pub fn shutdown_within(&self, timeout: Duration) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        let Running {
            queue,
            stop_tx,
            done_rx,
            handle,
            hook_routed,
            ..
        } = running;

        if hook_routed {
            release_global_hook(&self.interceptor);
        }
        queue.close();
        drop(stop_tx);

        match done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("netlog shipper worker thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("netlog shipper worker did not stop within {timeout:?}");
                false
            }
        }
    }
}

impl Drop for LogShipper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for LogShipper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogShipper")
            .field("config", &*self.stored.lock())
            .field("running", &self.is_running())
            .field("interceptor", &self.interceptor)
            .finish()
    }
}
