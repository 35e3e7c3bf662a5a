//! In-memory [`Transport`] with injectable failures.
//!
//! A [`TransportScript`] is shared between the test and the transport it
//! hands out, so the test can keep steering and observing the transport
//! after ownership moved into a session or worker.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::shipper::Transport;

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Shared control block for [`ScriptedTransport`].
#[derive(Debug)]
pub struct TransportScript {
    connect_failures: AtomicUsize,
    send_failures: AtomicUsize,
    alive: AtomicBool,
    connects: AtomicUsize,
    sends: AtomicUsize,
    closes: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl TransportScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connect_failures: AtomicUsize::new(0),
            send_failures: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Build a transport driven by this script.
    pub fn transport(self: &Arc<Self>) -> ScriptedTransport {
        ScriptedTransport {
            script: Arc::clone(self),
            open: false,
        }
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` sends fail with a broken pipe.
    pub fn fail_next_sends(&self, n: usize) {
        self.send_failures.store(n, Ordering::SeqCst);
    }

    /// Control what the liveness poll reports for an open transport.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Payloads delivered successfully, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

/// Transport that records payloads instead of touching the network.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Arc<TransportScript>,
    open: bool,
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, _host: &str, _port: u16) -> io::Result<()> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.script.connect_failures) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted connect failure",
            ));
        }
        self.open = true;
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        self.script.sends.fetch_add(1, Ordering::SeqCst);
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not open"));
        }
        if take_one(&self.script.send_failures) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted send failure",
            ));
        }
        self.script
            .sent
            .lock()
            .push(String::from_utf8_lossy(payload).into_owned());
        Ok(payload.len())
    }

    fn is_connected(&self) -> bool {
        self.open && self.script.alive.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }
}
