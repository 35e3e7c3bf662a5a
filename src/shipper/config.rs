//! Configuration consumed by [`LogShipper`](super::LogShipper).
//!
//! [`ShipperConfigBuilder`] validates every field before producing a
//! [`ShipperConfig`]; [`ShipperSettings`] is the serde-facing form with
//! millisecond fields for callers that load settings from a file.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

use crate::formatter::DEFAULT_MAX_MESSAGE_LEN;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

use super::transport::TransportKind;

/// Longest collector host name accepted, in bytes.
pub const MAX_HOST_LEN: usize = 127;
/// Default wait for a queued message before the worker re-checks its session.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default pause after each successful send.
pub const DEFAULT_CONNECTED_YIELD: Duration = Duration::from_millis(10);
/// Default pause after a failed connect or send.
pub const DEFAULT_DISCONNECTED_BACKOFF: Duration = Duration::from_secs(2);
/// Default connection timeout for stream transports.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default write timeout applied to socket writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised while validating configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid shipper configuration: {0}")]
    InvalidConfig(String),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

/// Validated configuration for the shipping pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ShipperConfig {
    pub host: String,
    pub port: u16,
    /// Install the process-wide `log` hook and ship what it sees.
    pub route_hook_to_network: bool,
    pub transport: TransportKind,
    pub capacity: usize,
    pub dequeue_timeout: Duration,
    pub connected_yield: Duration,
    pub disconnected_backoff: Duration,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub include_device_id: bool,
    pub max_message_len: usize,
    pub warn_interval: Duration,
    /// Most verbose level forwarded by the `log` hook.
    pub hook_level: LevelFilter,
}

impl ShipperConfig {
    /// Validated configuration for `host:port` with every other field at its
    /// default.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        route_hook_to_network: bool,
    ) -> Result<Self, ConfigError> {
        ShipperConfigBuilder::new()
            .with_host(host)
            .with_port(port)
            .with_route_hook_to_network(route_hook_to_network)
            .build()
    }

    /// Re-check the invariants the builder enforces.
    ///
    /// Fields are public, so a config may have been edited after building.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.host)?;
        validate_host_for_transport(&self.host, self.transport)?;
        validate_port(self.port)?;
        ensure_positive!(self.capacity, "capacity")?;
        ensure_positive!(self.max_message_len, "max_message_len")?;
        ensure_positive!(self.dequeue_timeout.as_millis(), "dequeue_timeout")?;
        ensure_positive!(self.disconnected_backoff.as_millis(), "disconnected_backoff")?;
        ensure_positive!(self.connect_timeout.as_millis(), "connect_timeout")?;
        ensure_positive!(self.write_timeout.as_millis(), "write_timeout")?;
        Ok(())
    }
}

fn validate_host(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidConfig("host must not be empty".into()));
    }
    if host.len() > MAX_HOST_LEN {
        return Err(ConfigError::InvalidConfig(format!(
            "host must be at most {MAX_HOST_LEN} bytes, got {}",
            host.len()
        )));
    }
    Ok(())
}

fn validate_host_for_transport(host: &str, transport: TransportKind) -> Result<(), ConfigError> {
    if !transport.resolves_hostnames() && host.parse::<IpAddr>().is_err() {
        return Err(ConfigError::InvalidConfig(format!(
            "{transport:?} transport needs a literal IP address, got {host:?}"
        )));
    }
    Ok(())
}

fn validate_port(port: u16) -> Result<(), ConfigError> {
    ensure_positive!(port, "port").map(|_| ())
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for [`ShipperConfig`].
#[derive(Clone, Debug, Default)]
pub struct ShipperConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    route_hook_to_network: Option<bool>,
    transport: Option<TransportKind>,
    capacity: Option<usize>,
    dequeue_timeout_ms: Option<u64>,
    connected_yield_ms: Option<u64>,
    disconnected_backoff_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    include_device_id: Option<bool>,
    max_message_len: Option<usize>,
    warn_interval_ms: Option<u64>,
    hook_level: Option<LevelFilter>,
}

impl ShipperConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector host name, address, or `ws://` URI.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    option_setter!(with_port, port, u16);
    option_setter!(
        /// Route the process-wide `log` hook to the network.
        with_route_hook_to_network,
        route_hook_to_network,
        bool
    );
    option_setter!(with_transport, transport, TransportKind);
    option_setter!(
        /// Maximum number of queued lines.
        with_capacity,
        capacity,
        usize
    );
    option_setter!(with_dequeue_timeout_ms, dequeue_timeout_ms, u64);
    option_setter!(with_connected_yield_ms, connected_yield_ms, u64);
    option_setter!(
        /// Pause after a failed connect or send.
        with_disconnected_backoff_ms,
        disconnected_backoff_ms,
        u64
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_include_device_id, include_device_id, bool);
    option_setter!(
        /// Upper bound on a line body in bytes; longer bodies are cut.
        with_max_message_len,
        max_message_len,
        usize
    );
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);
    option_setter!(with_hook_level, hook_level, LevelFilter);

    /// Validate the collected values and build the configuration.
    pub fn build(&self) -> Result<ShipperConfig, ConfigError> {
        let host = self
            .host
            .clone()
            .ok_or_else(|| ConfigError::InvalidConfig("host is required".into()))?;
        validate_host(&host)?;
        let port = self
            .port
            .ok_or_else(|| ConfigError::InvalidConfig("port is required".into()))?;
        validate_port(port)?;
        let transport = self.transport.unwrap_or_default();
        validate_host_for_transport(&host, transport)?;

        let positive_ms = |value: Option<u64>, field: &str, default: Duration| {
            value
                .map(|ms| ensure_positive!(ms, field).map(Duration::from_millis))
                .unwrap_or(Ok(default))
        };

        Ok(ShipperConfig {
            host,
            port,
            route_hook_to_network: self.route_hook_to_network.unwrap_or(false),
            transport,
            capacity: ensure_positive!(
                self.capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
                "capacity"
            )?,
            dequeue_timeout: positive_ms(
                self.dequeue_timeout_ms,
                "dequeue_timeout_ms",
                DEFAULT_DEQUEUE_TIMEOUT,
            )?,
            connected_yield: self
                .connected_yield_ms
                .map_or(DEFAULT_CONNECTED_YIELD, Duration::from_millis),
            disconnected_backoff: positive_ms(
                self.disconnected_backoff_ms,
                "disconnected_backoff_ms",
                DEFAULT_DISCONNECTED_BACKOFF,
            )?,
            connect_timeout: positive_ms(
                self.connect_timeout_ms,
                "connect_timeout_ms",
                DEFAULT_CONNECT_TIMEOUT,
            )?,
            write_timeout: positive_ms(
                self.write_timeout_ms,
                "write_timeout_ms",
                DEFAULT_WRITE_TIMEOUT,
            )?,
            include_device_id: self.include_device_id.unwrap_or(true),
            max_message_len: ensure_positive!(
                self.max_message_len.unwrap_or(DEFAULT_MAX_MESSAGE_LEN),
                "max_message_len"
            )?,
            warn_interval: self
                .warn_interval_ms
                .map_or(DEFAULT_WARN_INTERVAL, Duration::from_millis),
            hook_level: self.hook_level.unwrap_or(LevelFilter::Info),
        })
    }
}

/// Serde form of [`ShipperConfig`].
///
/// Durations are milliseconds and `hook_level` is a `log` level name.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipperSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub route_hook_to_network: bool,
    #[serde(default)]
    pub transport: TransportKind,
    pub capacity: Option<usize>,
    pub dequeue_timeout_ms: Option<u64>,
    pub connected_yield_ms: Option<u64>,
    pub disconnected_backoff_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub include_device_id: Option<bool>,
    pub max_message_len: Option<usize>,
    pub warn_interval_ms: Option<u64>,
    pub hook_level: Option<String>,
}

impl TryFrom<ShipperSettings> for ShipperConfig {
    type Error = ConfigError;

    fn try_from(settings: ShipperSettings) -> Result<Self, Self::Error> {
        let mut builder = ShipperConfigBuilder::new()
            .with_host(settings.host)
            .with_port(settings.port)
            .with_route_hook_to_network(settings.route_hook_to_network)
            .with_transport(settings.transport);
        builder.capacity = settings.capacity;
        builder.dequeue_timeout_ms = settings.dequeue_timeout_ms;
        builder.connected_yield_ms = settings.connected_yield_ms;
        builder.disconnected_backoff_ms = settings.disconnected_backoff_ms;
        builder.connect_timeout_ms = settings.connect_timeout_ms;
        builder.write_timeout_ms = settings.write_timeout_ms;
        builder.include_device_id = settings.include_device_id;
        builder.max_message_len = settings.max_message_len;
        builder.warn_interval_ms = settings.warn_interval_ms;
        if let Some(level) = settings.hook_level {
            let parsed = LevelFilter::from_str(&level).map_err(|_| {
                ConfigError::InvalidConfig(format!("unknown hook_level: {level}"))
            })?;
            builder.hook_level = Some(parsed);
        }
        builder.build()
    }
}
