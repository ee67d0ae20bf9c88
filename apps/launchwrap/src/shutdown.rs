//! # Exit Hook
//!
//! Keeps the unit cache index from being lost when the process ends without
//! unwinding. Every open cache is registered here while a launch runs, and is
//! saved from three places:
//!
//! - the [`ExitHook`] guard, when the launch returns normally
//! - the Ctrl-C / SIGTERM / SIGHUP handler
//! - [`exit`], which launched code calls instead of `std::process::exit`
//!
//! A raw `std::process::exit` or an abort still skips the flush.

use launchwrap_core::{ShutdownFlush, UnitCache};
use parking_lot::Mutex;
use std::sync::{Arc, Once};

/// Exit status used when a termination signal stops the process.
pub const SIGNAL_EXIT_CODE: i32 = 130;

static PENDING: Mutex<Vec<Arc<UnitCache>>> = parking_lot::const_mutex(Vec::new());
static HANDLER: Once = Once::new();

/// Registers a cache for exit-time saving; saves it when dropped.
#[derive(Debug)]
pub struct ExitHook {
    cache: Arc<UnitCache>,
    _flush: ShutdownFlush,
}

impl ExitHook {
    /// Register `cache` and make sure the signal handler is installed.
    #[must_use]
    pub fn install(cache: Arc<UnitCache>) -> Self {
        install_signal_handler();
        PENDING.lock().push(Arc::clone(&cache));
        Self {
            _flush: ShutdownFlush::new(Arc::clone(&cache)),
            cache,
        }
    }
}

impl Drop for ExitHook {
    fn drop(&mut self) {
        PENDING
            .lock()
            .retain(|pending| !Arc::ptr_eq(pending, &self.cache));
    }
}

/// Save every registered cache. Returns how many were saved.
///
/// Saved caches are deregistered; a cache flushes at most once anyway.
pub fn flush_pending() -> usize {
    let pending = std::mem::take(&mut *PENDING.lock());
    for cache in &pending {
        cache.save();
    }
    pending.len()
}

/// Save every registered cache, then end the process with `code`.
pub fn exit(code: i32) -> ! {
    flush_pending();
    std::process::exit(code)
}

fn install_signal_handler() {
    HANDLER.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            tracing::info!("Termination signal received, saving caches");
            exit(SIGNAL_EXIT_CODE);
        });
        if let Err(e) = installed {
            tracing::warn!("Failed to install termination handler: {}", e);
        }
    });
}

// =============================================================================
// TESTS
// =============================================================================
