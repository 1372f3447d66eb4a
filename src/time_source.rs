//! Wall-clock access for the archiver.

use chrono::{DateTime, Utc};

/// Provides the current time. Injected so batching and expiry decisions can be
/// driven deterministically.
pub trait TimeSource: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// The current time in epoch seconds.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
