//! Ships device log lines to a remote collector without blocking the
//! producer.
//!
//! Log statements are rendered into text lines, placed on a bounded queue,
//! and sent by a single worker thread over UDP, TCP, or WebSocket. When the
//! collector is unreachable lines accumulate up to the queue capacity and
//! newer ones are dropped; producers never wait on the network.
//!
//! ```rust,no_run
//! use netlog::{LogShipper, netlog_info};
//!
//! let shipper = LogShipper::new();
//! if shipper.configure("192.168.1.20", 5140, true) {
//!     shipper.start_configured().expect("start log shipping");
//! }
//! let _ = netlog_info!(shipper, "app", "booted in {} ms", 420);
//! ```

mod formatter;
mod identity;
mod interceptor;
mod log_compat;
mod log_message;
#[macro_use]
mod logging_macros;
mod queue;
mod rate_limited_warner;
mod severity;
pub mod shipper;
pub mod shipping_path;
mod toggle;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use formatter::{
    DEFAULT_MAX_MESSAGE_LEN, FormatError, MessageFormatter, render_line, truncate_body,
};
pub use identity::{
    AddressSource, DeviceIdentity, FixedAddress, HardwareAddress, SystemAddress, format_address,
    parse_address,
};
pub use interceptor::{
    ConsoleSink, ContextProbe, InterceptError, LogInterceptor, NoInterrupts, StderrConsole,
};
pub use log_compat::{NetworkLogBridge, is_routed_to, release_global_hook, route_global_hook};
pub use log_message::LogMessage;
pub use queue::{DEFAULT_QUEUE_CAPACITY, Dequeue, EnqueueError, ShippingQueue};
pub use rate_limited_warner::{DEFAULT_WARN_INTERVAL, RateLimitedWarner};
pub use severity::{COLOR_RESET, Severity};
pub use shipper::{
    ConfigError, LogShipper, ShipperConfig, ShipperConfigBuilder, ShipperSettings, StartError,
    Transport, TransportKind,
};
pub use toggle::SendingToggle;
