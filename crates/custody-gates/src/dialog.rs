use std::sync::Arc;
use std::time::Duration;

use custody_types::{AuthorityError, Clock, HardStopReason};
use tracing::error;

use crate::traits::DialogProbe;

/// Shared watcher for OS-native modals. Never caches: every call asks the probe.
pub struct DialogWatcher {
    probe: Arc<dyn DialogProbe>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl DialogWatcher {
    pub fn new(probe: Arc<dyn DialogProbe>, clock: Arc<dyn Clock>) -> Self {
        Self {
            probe,
            clock,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Hard-stop if any modal is visible right now.
    pub fn check_now(&self) -> Result<(), AuthorityError> {
        match self.probe.visible_modal() {
            Some(title) => {
                error!(dialog = %title, "System dialog visible; refusing to act");
                Err(AuthorityError::HardStop(HardStopReason::DialogVisible(title)))
            }
            None => Ok(()),
        }
    }

    /// Poll until no modal is visible or `timeout` elapses. Returns whether it cleared.
    pub fn wait_until_clear(&self, timeout: Duration) -> bool {
        let deadline = self.clock.now() + timeout;
        loop {
            if self.probe.visible_modal().is_none() {
                return true;
            }
            if self.clock.now() >= deadline {
                return false;
            }
            self.clock.sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockDialogProbe;
    use custody_types::ManualClock;

    #[test]
    fn visible_modal_is_hard_stop() {
        let probe = Arc::new(MockDialogProbe::new());
        let watcher = DialogWatcher::new(probe.clone(), Arc::new(ManualClock::new()));
        assert!(watcher.check_now().is_ok());

        probe.show("Save changes?");
        let err = watcher.check_now().unwrap_err();
        assert!(err.is_hard_stop());
    }

    #[test]
    fn every_check_reads_the_probe() {
        let probe = Arc::new(MockDialogProbe::new());
        let watcher = DialogWatcher::new(probe.clone(), Arc::new(ManualClock::new()));
        probe.show("Permission");
        assert!(watcher.check_now().is_err());
        probe.clear();
        assert!(watcher.check_now().is_ok());
        assert_eq!(probe.calls(), 2);
    }

    #[test]
    fn wait_until_clear_is_bounded() {
        let probe = Arc::new(MockDialogProbe::new());
        let clock = Arc::new(ManualClock::new());
        let watcher = DialogWatcher::new(probe.clone(), clock.clone());
        probe.show("Stuck");
        assert!(!watcher.wait_until_clear(Duration::from_secs(1)));
        assert!(clock.elapsed() >= Duration::from_secs(1));

        probe.clear();
        assert!(watcher.wait_until_clear(Duration::from_secs(1)));
    }
}
