//! Device identity used to tag outgoing log lines.
//!
//! The identity is the device's 6-byte hardware address rendered as
//! lowercase colon-separated hex. Reading the address may be costly (or, on
//! some platforms, unsafe to do concurrently), so [`DeviceIdentity`] reads it
//! at most once and caches the rendered string.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use once_cell::sync::OnceCell;
use rand::RngCore;

/// A raw 6-byte hardware address.
pub type HardwareAddress = [u8; 6];

/// Source of the hardware address backing a [`DeviceIdentity`].
pub trait AddressSource: Send + Sync {
    fn read_address(&self) -> HardwareAddress;
}

/// Address source returning a fixed value.
#[derive(Clone, Copy, Debug)]
pub struct FixedAddress(pub HardwareAddress);

impl AddressSource for FixedAddress {
    fn read_address(&self) -> HardwareAddress {
        self.0
    }
}

/// Address source backed by the operating system's network interfaces.
///
/// Picks the first interface with a non-zero address, skipping loopback.
/// When no address is available a random locally administered unicast
/// address is generated instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAddress;

const SYS_CLASS_NET: &str = "/sys/class/net";

impl SystemAddress {
    fn interface_address() -> Option<HardwareAddress> {
        let mut names: Vec<_> = fs::read_dir(SYS_CLASS_NET)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        names.sort();
        names.iter().find_map(|name| {
            let raw = fs::read_to_string(Path::new(SYS_CLASS_NET).join(name).join("address")).ok()?;
            parse_address(raw.trim()).filter(|addr| addr.iter().any(|b| *b != 0))
        })
    }

    fn random_address() -> HardwareAddress {
        let mut addr = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut addr);
        // locally administered, unicast
        addr[0] = (addr[0] | 0x02) & 0xfe;
        addr
    }
}

impl AddressSource for SystemAddress {
    fn read_address(&self) -> HardwareAddress {
        Self::interface_address().unwrap_or_else(Self::random_address)
    }
}

/// Parse a colon-separated hex address such as `3c:71:bf:0a:22:44`.
pub fn parse_address(text: &str) -> Option<HardwareAddress> {
    let mut addr = [0u8; 6];
    let mut parts = text.split(':');
    for byte in &mut addr {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(addr)
}

/// Render an address as lowercase colon-separated hex (17 characters).
pub fn format_address(addr: &HardwareAddress) -> String {
    let mut out = String::with_capacity(17);
    for (i, byte) in addr.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Lazily computed, immutable device identity.
pub struct DeviceIdentity {
    source: Box<dyn AddressSource>,
    cached: OnceCell<String>,
}

impl DeviceIdentity {
    pub fn new(source: impl AddressSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: OnceCell::new(),
        }
    }

    /// Identity backed by the system's network interfaces.
    pub fn system() -> Self {
        Self::new(SystemAddress)
    }

    /// Return the cached identity, reading the hardware address on first use.
    ///
    /// Concurrent first callers block on the same initialisation, so the
    /// address source is read exactly once.
    pub fn get(&self) -> &str {
        self.cached
            .get_or_init(|| format_address(&self.source.read_address()))
    }

    /// Whether the identity has already been computed.
    pub fn is_cached(&self) -> bool {
        self.cached.get().is_some()
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("cached", &self.cached.get())
            .finish()
    }
}
