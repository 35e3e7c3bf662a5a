//! Worker thread draining the shipping queue into the transport session.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, warn};

use crate::queue::{Dequeue, ShippingQueue};
use crate::rate_limited_warner::RateLimitedWarner;
use crate::shipping_path;

use super::config::ShipperConfig;
use super::session::{SessionState, TransportSession};

/// Outcome of one worker iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The collector could not be reached; nothing was dequeued.
    ConnectFailed,
    /// The dequeue wait expired.
    Idle,
    Sent,
    /// The send failed and the message went back to the head of the queue.
    SendFailed,
    /// The queue is closed and empty.
    Closed,
}

/// Single consumer of the [`ShippingQueue`].
pub struct ShippingWorker {
    session: TransportSession,
    queue: Arc<ShippingQueue>,
    dequeue_timeout: Duration,
    connected_yield: Duration,
    disconnected_backoff: Duration,
    connect_warner: RateLimitedWarner,
    send_warner: RateLimitedWarner,
}

impl ShippingWorker {
    pub fn new(session: TransportSession, queue: Arc<ShippingQueue>, config: &ShipperConfig) -> Self {
        Self {
            session,
            queue,
            dequeue_timeout: config.dequeue_timeout,
            connected_yield: config.connected_yield,
            disconnected_backoff: config.disconnected_backoff,
            connect_warner: RateLimitedWarner::new(config.warn_interval),
            send_warner: RateLimitedWarner::new(config.warn_interval),
        }
    }

    pub fn session(&self) -> &TransportSession {
        &self.session
    }

    /// How long to wait before the next iteration.
    pub fn pause(&self, step: Step) -> Duration {
        match step {
            Step::ConnectFailed | Step::SendFailed => self.disconnected_backoff,
            Step::Sent => self.connected_yield,
            Step::Idle | Step::Closed => Duration::ZERO,
        }
    }

    /// Run one iteration of the shipping loop.
    pub fn step(&mut self) -> Step {
        if self.session.state() == SessionState::Connected && !self.session.is_connected() {
            debug!("netlog shipper lost the collector connection; reconnecting");
            self.session.close();
        }

        if self.session.state() == SessionState::Disconnected {
            if let Err(err) = self.session.connect() {
                let (host, port) = (self.session.host(), self.session.port());
                self.connect_warner.record_drop();
                self.connect_warner.warn_if_due(|count| {
                    warn!(
                        "netlog shipper failed to connect to {host}:{port}: {err} ({count} attempts)"
                    );
                });
                return Step::ConnectFailed;
            }
            debug!(
                "netlog shipper connected to {}:{}",
                self.session.host(),
                self.session.port()
            );
        }

        let msg = match self.queue.dequeue(self.dequeue_timeout) {
            Dequeue::Message(msg) => msg,
            Dequeue::Idle => return Step::Idle,
            Dequeue::Closed => return Step::Closed,
        };

        match self.session.send(msg.as_bytes()) {
            Ok(_) => Step::Sent,
            Err(err) => {
                let kept = self.queue.requeue_front(msg);
                self.send_warner.record_drop();
                self.send_warner.warn_if_due(|count| {
                    warn!(
                        "netlog shipper send failed: {err} ({count} failures, last line {})",
                        if kept { "requeued" } else { "dropped" }
                    );
                });
                Step::SendFailed
            }
        }
    }

    /// Drive the loop until `stop` fires or its sender is dropped.
    ///
    /// After a stop request the worker keeps sending only while sends
    /// succeed, so a reachable collector receives what is already queued.
    pub fn run(mut self, stop: Receiver<()>) {
        let _guard = shipping_path::enter();
        let mut stopping = false;
        loop {
            let step = self.step();
            match step {
                Step::Closed => break,
                Step::Sent => {}
                _ if stopping => break,
                _ => {}
            }
            if stopping {
                continue;
            }
            if stop_requested(&stop, self.pause(step)) {
                stopping = true;
                if step != Step::Sent {
                    break;
                }
            }
        }
        self.session.close();
        self.send_warner.flush(|count| {
            warn!("netlog shipper had {count} unreported send failures at shutdown");
        });
    }
}

fn stop_requested(stop: &Receiver<()>, pause: Duration) -> bool {
    match stop.recv_timeout(pause) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

impl std::fmt::Debug for ShippingWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingWorker")
            .field("session", &self.session)
            .field("dequeue_timeout", &self.dequeue_timeout)
            .finish()
    }
}
