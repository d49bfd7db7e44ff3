//! Process-wide logging setup.
//!
//! A capture worker, an HTTP thread pool, and a control thread all touch
//! shared state concurrently, so plain stdout `println!` calls would
//! interleave illegibly. This installs a `tracing` subscriber once; every
//! subsystem logs through `tracing::{debug,info,warn,error}` with
//! structured fields.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the global `tracing` subscriber. Safe to call more than once;
/// only the first call takes effect.
#[cfg(feature = "logging")]
pub fn init() {
    INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).with_target(true).init();
    });
}

#[cfg(not(feature = "logging"))]
pub fn init() {
    INIT.call_once(|| {});
}

/// Rate limiter for noisy per-frame errors (§7: "one log per 100 errors").
#[derive(Debug, Default)]
pub struct ErrorRateLimiter {
    count: u64,
}

impl ErrorRateLimiter {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    /// Returns `true` on the call that should actually be logged.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        self.count % 100 == 1
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_first_and_every_hundredth() {
        let mut limiter = ErrorRateLimiter::new();
        assert!(limiter.tick());
        for _ in 0..98 {
            assert!(!limiter.tick());
        }
        assert!(limiter.tick());
        assert_eq!(limiter.count(), 100);
    }
}
