//! Thread-scoped marker for code running on the shipping path.
//!
//! Anything that logs while a thread is marked (the shipping worker itself,
//! a network stack thread driven by it, or the interceptor while it is
//! enqueueing) must not feed that line back into shipment. The log bridge
//! checks [`is_active`] before doing any network work.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Whether the current thread is inside the shipping path.
pub fn is_active() -> bool {
    DEPTH.with(|depth| depth.get() > 0)
}

/// Mark the current thread as inside the shipping path until the guard drops.
pub fn enter() -> ShippingPathGuard {
    DEPTH.with(|depth| depth.set(depth.get().saturating_add(1)));
    ShippingPathGuard {
        _not_send: PhantomData,
    }
}

/// RAII guard returned by [`enter`]. Guards nest.
#[must_use = "the shipping path is left as soon as the guard is dropped"]
pub struct ShippingPathGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ShippingPathGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn guard_scopes_the_marker() {
        assert!(!is_active());
        {
            let _outer = enter();
            assert!(is_active());
            {
                let _inner = enter();
                assert!(is_active());
            }
            assert!(is_active(), "outer guard still held");
        }
        assert!(!is_active());
    }

    #[test]
    fn marker_is_per_thread() {
        let _guard = enter();
        let other = thread::spawn(is_active).join().expect("probe thread");
        assert!(!other);
        assert!(is_active());
    }
}
