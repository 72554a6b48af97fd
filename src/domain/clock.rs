//! Clock
//!
//! Injected time source. Activities never call `Utc::now()` directly;
//! they take a clock so tests can pin timestamps.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Time source for activities and sagas.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Create a clock pinned to the given instant.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Clock pinned to 2026-01-01T00:00:00Z.
    pub fn epoch() -> Self {
        Self(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_is_stable() {
        let clock = FixedClock::epoch();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().timestamp(), 1767225600);
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
