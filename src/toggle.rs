//! Runtime switch for network shipment.

use std::sync::atomic::{AtomicBool, Ordering};

/// Enables or disables network shipment of new lines.
///
/// The flag is consulted when a line is about to be enqueued. Lines already
/// in the queue are shipped regardless of later changes.
#[derive(Debug)]
pub struct SendingToggle {
    enabled: AtomicBool,
}

impl Default for SendingToggle {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SendingToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_enabled() {
        assert!(SendingToggle::default().is_enabled());
    }

    #[test]
    fn flips_both_ways() {
        let toggle = SendingToggle::default();
        toggle.set(false);
        assert!(!toggle.is_enabled());
        toggle.set(true);
        assert!(toggle.is_enabled());
    }
}
