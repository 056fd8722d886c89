use std::sync::Arc;
use std::time::{Duration, Instant};

use custody_types::Clock;
use parking_lot::Mutex;

/// Tracks explicit user actions. Silence past the timeout forces a consent
/// checkpoint. A tracker that has never seen an action reports silence.
pub struct SilenceTracker {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    last_action: Mutex<Option<Instant>>,
}

impl SilenceTracker {
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            clock,
            timeout,
            last_action: Mutex::new(None),
        }
    }

    pub fn record_user_action(&self) {
        *self.last_action.lock() = Some(self.clock.now());
    }

    pub fn is_silent(&self) -> bool {
        match *self.last_action.lock() {
            None => true,
            Some(at) => self.clock.now().saturating_duration_since(at) > self.timeout,
        }
    }

    /// Time left before silence is declared.
    pub fn remaining(&self) -> Duration {
        match *self.last_action.lock() {
            None => Duration::ZERO,
            Some(at) => self
                .timeout
                .saturating_sub(self.clock.now().saturating_duration_since(at)),
        }
    }

    pub fn reset(&self) {
        *self.last_action.lock() = None;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Absolute session lifetime. No grace period, no extensions.
pub struct SessionTtl {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    started: Mutex<Option<Instant>>,
}

impl SessionTtl {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            started: Mutex::new(None),
        }
    }

    /// Start the countdown. A running countdown is not restarted.
    pub fn start(&self) {
        let mut started = self.started.lock();
        if started.is_none() {
            *started = Some(self.clock.now());
        }
    }

    pub fn is_expired(&self) -> bool {
        match *self.started.lock() {
            None => false,
            Some(at) => self.clock.now() >= at + self.ttl,
        }
    }

    pub fn remaining(&self) -> Duration {
        match *self.started.lock() {
            None => Duration::ZERO,
            Some(at) => (at + self.ttl).saturating_duration_since(self.clock.now()),
        }
    }

    pub fn clear(&self) {
        *self.started.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::ManualClock;

    #[test]
    fn no_action_counts_as_silence() {
        let clock = Arc::new(ManualClock::new());
        let tracker = SilenceTracker::new(clock, Duration::from_secs(30));
        assert!(tracker.is_silent());
        assert_eq!(tracker.remaining(), Duration::ZERO);
    }

    #[test]
    fn silence_after_timeout() {
        let clock = Arc::new(ManualClock::new());
        let tracker = SilenceTracker::new(clock.clone(), Duration::from_secs(30));
        tracker.record_user_action();
        clock.advance(Duration::from_secs(30));
        assert!(!tracker.is_silent());
        clock.advance(Duration::from_millis(1));
        assert!(tracker.is_silent());

        tracker.record_user_action();
        assert!(!tracker.is_silent());
        assert_eq!(tracker.remaining(), Duration::from_secs(30));
    }

    #[test]
    fn reset_returns_to_silent() {
        let clock = Arc::new(ManualClock::new());
        let tracker = SilenceTracker::new(clock, Duration::from_secs(30));
        tracker.record_user_action();
        tracker.reset();
        assert!(tracker.is_silent());
    }

    #[test]
    fn ttl_expires_without_extension() {
        let clock = Arc::new(ManualClock::new());
        let ttl = SessionTtl::new(clock.clone(), Duration::from_secs(60));
        assert!(!ttl.is_expired());

        ttl.start();
        clock.advance(Duration::from_secs(59));
        ttl.start();
        assert!(!ttl.is_expired());
        assert_eq!(ttl.remaining(), Duration::from_secs(1));

        clock.advance(Duration::from_secs(1));
        assert!(ttl.is_expired());
        assert_eq!(ttl.remaining(), Duration::ZERO);

        ttl.clear();
        assert!(!ttl.is_expired());
    }
}
