//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Clock whose time only moves when told to.
///
/// Drives filter window rotation and cache expiry deterministically. Clones
/// share the same time value.
///
/// # Examples
///
/// ```
/// use stack_throttle::infrastructure::mocks::MockClock;
/// use stack_throttle::application::ports::Clock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// assert_eq!(clock.now(), start);
///
/// clock.advance(Duration::from_secs(30));
/// assert_eq!(clock.now(), start + Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        *self.lock() += duration;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        *self.lock() = instant;
    }

    // A panicking test thread must not wedge every other user of the clock.
    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock() {
        let start = Instant::now();
        let clock = MockClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now(), start + Duration::from_secs(10));

        let new_time = start + Duration::from_secs(100);
        clock.set(new_time);
        assert_eq!(clock.now(), new_time);
    }

    #[test]
    fn test_clones_share_time() {
        let start = Instant::now();
        let clock = MockClock::new(start);
        let other = clock.clone();

        std::thread::spawn(move || other.advance(Duration::from_secs(5)))
            .join()
            .unwrap();
        assert_eq!(clock.now(), start + Duration::from_secs(5));
    }
}
