//! Injected time source.
//!
//! The engine never reads wall-clock time directly; every time-gated
//! transition asks a [`Clock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use cvdao_types::Timestamp;

/// Monotonic source of the current timestamp (seconds).
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock seconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move time forward by `secs`, saturating at `u64::MAX`. Returns the
    /// new time.
    pub fn advance(&self, secs: u64) -> Timestamp {
        let previous = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(secs)))
            .unwrap_or_else(|now| now);
        previous.saturating_add(secs)
    }

    /// Jump to `at`. Time never moves backwards; earlier targets are ignored.
    pub fn set(&self, at: Timestamp) -> Timestamp {
        self.now.fetch_max(at, Ordering::SeqCst).max(at)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
