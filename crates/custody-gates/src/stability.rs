use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use custody_types::{Clock, FileIdentity};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Observable state of an export output file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputSnapshot {
    pub len: Option<u64>,
    pub modified: Option<SystemTime>,
    pub identity: Option<FileIdentity>,
}

impl OutputSnapshot {
    /// Read size, mtime and identity. A missing file yields an all-`None` snapshot.
    pub fn capture(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => Self {
                len: Some(meta.len()),
                modified: meta.modified().ok(),
                identity: FileIdentity::resolve(path).ok(),
            },
            Err(_) => Self::default(),
        }
    }

    pub fn exists(&self) -> bool {
        self.len.is_some()
    }
}

/// Result of waiting for an output to settle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollOutcome {
    /// Unchanged for the whole stable window.
    Stable,
    /// Still changing when the timeout hit.
    StillChanging,
    /// Never changed, but the stable window did not fit in the timeout.
    TimedOut,
}

/// Polls an output file until it stops changing.
#[derive(Clone)]
pub struct StabilityPoller {
    clock: Arc<dyn Clock>,
    interval: Duration,
    stable_window: Duration,
    timeout: Duration,
}

impl StabilityPoller {
    pub fn new(
        clock: Arc<dyn Clock>,
        interval: Duration,
        stable_window: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            clock,
            interval,
            stable_window,
            timeout,
        }
    }

    pub fn wait_stable(&self, path: &Path) -> PollOutcome {
        let start = self.clock.now();
        let deadline = start + self.timeout;
        let mut last = OutputSnapshot::capture(path);
        let mut stable_since = start;
        let mut changed = false;

        loop {
            self.clock.sleep(self.interval);
            let now = self.clock.now();
            let current = OutputSnapshot::capture(path);

            if current != last {
                debug!(path = %path.display(), len = ?current.len, "Output still changing");
                last = current;
                stable_since = now;
                changed = true;
            } else if now.duration_since(stable_since) >= self.stable_window {
                return PollOutcome::Stable;
            }

            if now >= deadline {
                return if changed {
                    PollOutcome::StillChanging
                } else {
                    PollOutcome::TimedOut
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::{ManualClock, SystemClock};
    use proptest::prelude::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn poller(clock: Arc<dyn Clock>, window_ms: u64, timeout_ms: u64) -> StabilityPoller {
        StabilityPoller::new(
            clock,
            Duration::from_millis(20),
            Duration::from_millis(window_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn idle_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mix.wav");
        std::fs::write(&out, b"done").unwrap();

        let clock = Arc::new(ManualClock::new());
        assert_eq!(poller(clock, 100, 1_000).wait_stable(&out), PollOutcome::Stable);
    }

    #[test]
    fn missing_file_counts_as_stable() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        assert_eq!(
            poller(clock, 100, 1_000).wait_stable(&dir.path().join("never.wav")),
            PollOutcome::Stable
        );
    }

    #[test]
    fn window_longer_than_timeout_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mix.wav");
        std::fs::write(&out, b"done").unwrap();

        let clock = Arc::new(ManualClock::new());
        assert_eq!(poller(clock, 500, 100).wait_stable(&out), PollOutcome::TimedOut);
    }

    #[test]
    fn growing_file_is_still_changing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mix.wav");
        std::fs::write(&out, b"").unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let out = out.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    if let Ok(mut f) = std::fs::OpenOptions::new().append(true).open(&out) {
                        let _ = f.write_all(&[0u8; 64]);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let outcome = poller(Arc::new(SystemClock), 200, 400).wait_stable(&out);
        stop.store(true, Ordering::SeqCst);
        writer.join().unwrap();

        assert_eq!(outcome, PollOutcome::StillChanging);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn idle_output_settles_when_the_window_fits(
            interval in 1u64..50,
            window in 1u64..2_000,
            slack in 1u64..1_000,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("mix.wav");
            std::fs::write(&out, b"done").unwrap();

            let poller = StabilityPoller::new(
                Arc::new(ManualClock::new()),
                Duration::from_millis(interval),
                Duration::from_millis(window),
                Duration::from_millis(window + slack),
            );
            prop_assert_eq!(poller.wait_stable(&out), PollOutcome::Stable);
        }

        #[test]
        fn idle_output_times_out_when_the_window_does_not_fit(
            interval in 1u64..50,
            timeout in 1u64..2_000,
            excess in 0u64..1_000,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("mix.wav");
            std::fs::write(&out, b"done").unwrap();

            let poller = StabilityPoller::new(
                Arc::new(ManualClock::new()),
                Duration::from_millis(interval),
                Duration::from_millis(timeout + interval + excess),
                Duration::from_millis(timeout),
            );
            prop_assert_eq!(poller.wait_stable(&out), PollOutcome::TimedOut);
        }
    }
}
