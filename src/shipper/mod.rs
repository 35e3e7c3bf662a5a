//! Network side of the pipeline.
//!
//! [`LogShipper`] owns a bounded [`ShippingQueue`](crate::queue::ShippingQueue)
//! and one worker thread. The worker keeps a [`TransportSession`] to the
//! collector, reconnects after a fixed backoff when the collector is
//! unreachable, and puts lines that failed to send back at the head of the
//! queue.

mod config;
mod service;
mod session;
mod transport;
mod worker;


pub use config::{
    ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONNECTED_YIELD, DEFAULT_DEQUEUE_TIMEOUT,
    DEFAULT_DISCONNECTED_BACKOFF, DEFAULT_WRITE_TIMEOUT, MAX_HOST_LEN, ShipperConfig,
    ShipperConfigBuilder, ShipperSettings,
};
pub use service::{LogShipper, StartError, WORKER_THREAD_NAME};
pub use session::{SessionState, TransportSession};
pub use transport::{
    TcpTransport, Transport, TransportKind, UdpTransport, WebSocketTransport, websocket_url,
};
pub use worker::{ShippingWorker, Step};
