//! Connection state machine wrapping one [`Transport`].
//!
//! The session cycles between [`SessionState::Disconnected`] and
//! [`SessionState::Connected`] for as long as the worker runs. A failed send
//! always tears the transport down, so a stale handle is never reused.

use std::io;

use super::transport::Transport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// A transport bound to the collector address.
pub struct TransportSession {
    transport: Box<dyn Transport>,
    host: String,
    port: u16,
    state: SessionState,
}

impl TransportSession {
    pub fn new(transport: Box<dyn Transport>, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Open the transport to the collector.
    ///
    /// On failure the transport is closed again and the session stays
    /// disconnected.
    pub fn connect(&mut self) -> io::Result<()> {
        if self.state == SessionState::Connected {
            self.close();
        }
        match self.transport.connect(&self.host, self.port) {
            Ok(()) => {
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(err) => {
                self.transport.close();
                self.state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Send one payload.
    ///
    /// Fails fast with `NotConnected` while disconnected. Any transport error
    /// closes the transport before it is returned.
    pub fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        if self.state != SessionState::Connected {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "session is disconnected",
            ));
        }
        self.transport.send(payload).inspect_err(|_| self.close())
    }

    /// Whether the session is connected and the transport still looks alive.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.transport.is_connected()
    }

    pub fn close(&mut self) {
        self.transport.close();
        self.state = SessionState::Disconnected;
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state)
            .finish()
    }
}
