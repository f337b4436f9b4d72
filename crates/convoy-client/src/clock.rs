//! Wall-clock source handed to shard updaters.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock {
    /// Time since the Unix epoch.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
