//! Wall-clock source for credential issuance and expiry checks
//!
//! Expiry is computed from wall-clock time, so a system clock adjustment
//! shifts it. `ManualClock` lets tests move time without sleeping.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Source of "now" for issuing and checking credentials.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The process wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Starts at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemTime::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: SystemTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_secs(25));
        assert_eq!(clock.now(), start + Duration::from_secs(25));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
