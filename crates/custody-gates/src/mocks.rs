//! In-memory probes and launchers for tests and hosts without a window server.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use custody_types::{FieldClassification, WindowIdentity};
use parking_lot::Mutex;

use crate::gates::export::JobSpec;
use crate::traits::{DialogProbe, FieldClassifier, JobLauncher, JobProcess, WindowProbe};

/// Dialog probe driven by the test.
#[derive(Default)]
pub struct MockDialogProbe {
    visible: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockDialogProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, title: &str) {
        *self.visible.lock() = Some(title.to_string());
    }

    pub fn clear(&self) {
        *self.visible.lock() = None;
    }

    /// How many times the probe was consulted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DialogProbe for MockDialogProbe {
    fn visible_modal(&self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.visible.lock().clone()
    }
}

/// Window probe backed by a map of window number to identity.
#[derive(Default)]
pub struct MockWindowProbe {
    windows: Mutex<HashMap<u64, WindowIdentity>>,
}

impl MockWindowProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, identity: WindowIdentity) {
        self.windows.lock().insert(identity.window_number, identity);
    }

    pub fn remove(&self, window_number: u64) {
        self.windows.lock().remove(&window_number);
    }
}

impl WindowProbe for MockWindowProbe {
    fn live_identity(&self, window_number: u64) -> Option<WindowIdentity> {
        self.windows.lock().get(&window_number).cloned()
    }
}

/// Classifier with a default answer and per-field overrides.
pub struct MockFieldClassifier {
    default: FieldClassification,
    fields: Mutex<HashMap<String, FieldClassification>>,
}

impl MockFieldClassifier {
    pub fn new(default: FieldClassification) -> Self {
        Self {
            default,
            fields: Mutex::new(HashMap::new()),
        }
    }

    pub fn mark(&self, field_id: &str, classification: FieldClassification) {
        self.fields
            .lock()
            .insert(field_id.to_string(), classification);
    }
}

impl FieldClassifier for MockFieldClassifier {
    fn classify(&self, _window: &WindowIdentity, field_id: &str) -> FieldClassification {
        self.fields
            .lock()
            .get(field_id)
            .copied()
            .unwrap_or(self.default)
    }
}

/// How a mock export job reacts to signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockJobBehavior {
    /// The whole group exits on SIGTERM.
    Cooperative,
    /// The whole group survives SIGTERM and dies on SIGKILL.
    IgnoresTerm,
    /// The leader exits on SIGTERM; its workers only die on SIGKILL.
    WorkerIgnoresTerm,
    /// The leader exits right after launch, leaving its workers running in
    /// the group until SIGTERM.
    LeaderExits,
    /// The group dies on SIGTERM but a worker that escaped it keeps appending
    /// to the output every `write_every` until [`MockJobLauncher::stop_all`].
    Runaway { write_every: Duration },
}

struct MockJobState {
    leader: AtomicBool,
    workers: AtomicBool,
}

impl MockJobState {
    fn exit(&self) {
        self.leader.store(false, Ordering::SeqCst);
        self.workers.store(false, Ordering::SeqCst);
    }
}

/// Launcher that records every launch and signal.
pub struct MockJobLauncher {
    behavior: MockJobBehavior,
    next_pid: AtomicU32,
    jobs: Mutex<Vec<Arc<MockJobState>>>,
    signals: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
}

impl MockJobLauncher {
    pub fn new(behavior: MockJobBehavior) -> Self {
        Self {
            behavior,
            next_pid: AtomicU32::new(40_000),
            jobs: Mutex::new(Vec::new()),
            signals: Arc::new(Mutex::new(Vec::new())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn launched(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Every signal sent, in order (`"TERM"`, `"KILL"`).
    pub fn signals(&self) -> Vec<String> {
        self.signals.lock().clone()
    }

    /// Let every job's whole group exit on its own.
    pub fn finish_all(&self) {
        for job in self.jobs.lock().iter() {
            job.exit();
        }
    }

    /// Stop runaway writers.
    pub fn stop_all(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.finish_all();
    }

    fn spawn_writer(&self, output: PathBuf, every: Duration) {
        let stop = self.stop.clone();
        std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                if let Ok(mut file) = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&output)
                {
                    let _ = file.write_all(&[0u8; 256]);
                }
                std::thread::sleep(every);
            }
        });
    }
}

impl JobLauncher for MockJobLauncher {
    fn launch(&self, spec: &JobSpec) -> io::Result<Box<dyn JobProcess>> {
        let state = Arc::new(MockJobState {
            leader: AtomicBool::new(self.behavior != MockJobBehavior::LeaderExits),
            workers: AtomicBool::new(true),
        });
        self.jobs.lock().push(state.clone());

        if let MockJobBehavior::Runaway { write_every } = self.behavior {
            self.spawn_writer(spec.output.clone(), write_every);
        }

        Ok(Box::new(MockJobProcess {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            behavior: self.behavior,
            state,
            signals: self.signals.clone(),
        }))
    }
}

struct MockJobProcess {
    pid: u32,
    behavior: MockJobBehavior,
    state: Arc<MockJobState>,
    signals: Arc<Mutex<Vec<String>>>,
}

impl JobProcess for MockJobProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn terminate_group(&mut self) -> io::Result<()> {
        self.signals.lock().push("TERM".to_string());
        match self.behavior {
            MockJobBehavior::IgnoresTerm => {}
            MockJobBehavior::WorkerIgnoresTerm => self.state.leader.store(false, Ordering::SeqCst),
            _ => self.state.exit(),
        }
        Ok(())
    }

    fn kill_group(&mut self) -> io::Result<()> {
        self.signals.lock().push("KILL".to_string());
        self.state.exit();
        Ok(())
    }

    fn try_reap(&mut self) -> io::Result<bool> {
        Ok(!self.state.leader.load(Ordering::SeqCst))
    }

    fn group_alive(&mut self) -> io::Result<bool> {
        Ok(self.state.leader.load(Ordering::SeqCst) || self.state.workers.load(Ordering::SeqCst))
    }
}
