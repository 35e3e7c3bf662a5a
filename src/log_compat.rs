//! Bridge from the Rust `log` facade into the interceptor.
//!
//! `log` accepts a single global logger per process, so the bridge is a
//! static adapter installed at most once. Each started service with the hook
//! enabled registers its [`LogInterceptor`] as the active route; the adapter
//! forwards every record to whichever interceptor is active. Records seen
//! while no interceptor is registered are written to standard error.

use std::sync::{Arc, OnceLock};

use log::{LevelFilter, Metadata, Record};
use parking_lot::RwLock;

use crate::interceptor::LogInterceptor;
use crate::severity::Severity;

/// Adapter implementing the Rust `log::Log` trait.
pub struct NetworkLogBridge {
    active: RwLock<Option<Arc<LogInterceptor>>>,
}

impl NetworkLogBridge {
    const fn new() -> Self {
        Self {
            active: parking_lot::const_rwlock(None),
        }
    }

    fn current(&self) -> Option<Arc<LogInterceptor>> {
        self.active.read().clone()
    }
}

fn is_enabled_by_global_max(level: log::Level) -> bool {
    log::max_level() >= level.to_level_filter()
}

impl log::Log for NetworkLogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        is_enabled_by_global_max(metadata.level())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let severity = Severity::from(record.level());
        match self.current() {
            Some(interceptor) => {
                let _ = interceptor.route_system_log(severity, record.target(), *record.args());
            }
            None => eprintln!("{} {}: {}", severity.letter(), record.target(), record.args()),
        }
    }

    fn flush(&self) {}
}

static BRIDGE: NetworkLogBridge = NetworkLogBridge::new();
static INSTALL_RESULT: OnceLock<bool> = OnceLock::new();

/// Install the bridge as the global Rust logger.
///
/// Returns `true` on success. When a different global logger is already set,
/// installation fails and `false` is returned. Subsequent calls return the
/// cached outcome.
fn install_global_logger() -> bool {
    *INSTALL_RESULT.get_or_init(|| log::set_logger(&BRIDGE).is_ok())
}

/// Route the process-wide `log` hook into `interceptor`.
///
/// Replaces any previously routed interceptor and sets the global maximum
/// level to `level`. Returns `false` if another logger owns the hook.
pub fn route_global_hook(interceptor: Arc<LogInterceptor>, level: LevelFilter) -> bool {
    if !install_global_logger() {
        return false;
    }
    *BRIDGE.active.write() = Some(interceptor);
    log::set_max_level(level);
    true
}

/// Stop routing the hook into `interceptor` if it is the active route.
pub fn release_global_hook(interceptor: &Arc<LogInterceptor>) -> bool {
    let mut active = BRIDGE.active.write();
    match active.as_ref() {
        Some(current) if Arc::ptr_eq(current, interceptor) => {
            *active = None;
            true
        }
        _ => false,
    }
}

/// Whether `interceptor` currently receives the hook.
pub fn is_routed_to(interceptor: &Arc<LogInterceptor>) -> bool {
    BRIDGE
        .current()
        .is_some_and(|current| Arc::ptr_eq(&current, interceptor))
}
