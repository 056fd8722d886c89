use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use custody_audit::AuditEventType;
use custody_session::{EndReason, RevocationListener};
use custody_types::{
    AuthorityError, Capability, Clock, DenyReason, FileIdentity, HardStopReason, JobId, Scope,
    SessionId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::base::GateBase;
use crate::request::{GateClearance, GateRequest, RequestTarget};
use crate::stability::{PollOutcome, StabilityPoller};
use crate::traits::{EnforcementGate, JobLauncher, JobProcess};

/// What to run for an export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Where the job writes. Must equal the grant's export scope.
    pub output: PathBuf,
}

/// Lifecycle of an export job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    /// Cancelled and verified stopped.
    Cancelled,
    /// Every process of the group exited on its own.
    Exited,
    /// Cancelled, but the output kept changing.
    Runaway,
}

/// Termination timings.
#[derive(Clone, Debug)]
pub struct ExportConfig {
    /// Time between SIGTERM and SIGKILL.
    pub grace: Duration,
    pub poll_interval: Duration,
    /// How long the output must stay unchanged to count as stopped.
    pub stable_window: Duration,
    pub verify_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            stable_window: Duration::from_millis(500),
            verify_timeout: Duration::from_secs(5),
        }
    }
}

/// Caller-facing handle for a running export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJobHandle {
    pub id: JobId,
    pub session: SessionId,
    pub pid: u32,
    pub output: PathBuf,
    pub started_at: DateTime<Utc>,
}

struct JobEntry {
    handle: ExportJobHandle,
    process: Option<Box<dyn JobProcess>>,
    status: JobStatus,
}

/// Gate and owner for RENDER_EXPORT jobs.
///
/// Every job runs in its own process group so cancellation reaches every
/// worker it spawned. Cancellation is only reported once the output has
/// stopped changing.
pub struct ExportJobController {
    base: GateBase,
    launcher: Arc<dyn JobLauncher>,
    clock: Arc<dyn Clock>,
    config: ExportConfig,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl ExportJobController {
    pub fn new(
        base: GateBase,
        launcher: Arc<dyn JobLauncher>,
        clock: Arc<dyn Clock>,
        config: ExportConfig,
    ) -> Self {
        Self {
            base,
            launcher,
            clock,
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Enforce `request` and launch `spec`.
    pub fn start(
        &self,
        request: &GateRequest,
        spec: &JobSpec,
    ) -> Result<ExportJobHandle, AuthorityError> {
        self.enforce(request)?;
        if request.scope.path() != Some(spec.output.as_path()) {
            return Err(AuthorityError::CapabilityDenied(DenyReason::OutsideBookmark(
                spec.output.clone(),
            )));
        }

        let process = self.launcher.launch(spec)?;
        let handle = ExportJobHandle {
            id: JobId::new(),
            session: request.session.clone(),
            pid: process.id(),
            output: spec.output.clone(),
            started_at: Utc::now(),
        };

        self.base.audit().append(
            AuditEventType::ExportStarted,
            json!({
                "job": handle.id.to_string(),
                "session": handle.session.as_str(),
                "pid": handle.pid,
                "program": spec.program,
                "output": spec.output,
            }),
        );
        info!(job = %handle.id, pid = handle.pid, output = %spec.output.display(), "Export started");

        self.jobs.lock().insert(
            handle.id,
            JobEntry {
                handle: handle.clone(),
                process: Some(process),
                status: JobStatus::Running,
            },
        );
        Ok(handle)
    }

    /// Current status. A job only counts as exited once its whole group is
    /// gone; a leader that exits early leaves the job running.
    pub fn status(&self, job: JobId) -> Option<JobStatus> {
        let mut jobs = self.jobs.lock();
        let entry = jobs.get_mut(&job)?;
        if entry.status == JobStatus::Running {
            let exited = entry
                .process
                .as_mut()
                .map(|p| drained(p.as_mut()))
                .unwrap_or(false);
            if exited {
                entry.status = JobStatus::Exited;
                entry.process = None;
            }
        }
        Some(entry.status)
    }

    pub fn running(&self) -> Vec<ExportJobHandle> {
        self.jobs
            .lock()
            .values()
            .filter(|e| e.status == JobStatus::Running)
            .map(|e| e.handle.clone())
            .collect()
    }

    /// Stop `job` and every process it spawned, then verify it stopped.
    ///
    /// Returns the final status, or `HardStop(JobDidNotStop)` if the output
    /// was still changing after the kill.
    pub fn cancel(&self, job: JobId) -> Result<JobStatus, AuthorityError> {
        let (handle, process) = {
            let mut jobs = self.jobs.lock();
            let entry = jobs.get_mut(&job).ok_or_else(|| {
                AuthorityError::CapabilityDenied(DenyReason::TargetMissing(job.to_string()))
            })?;
            if entry.status != JobStatus::Running {
                return match entry.status {
                    JobStatus::Runaway => Err(AuthorityError::HardStop(
                        HardStopReason::JobDidNotStop(job),
                    )),
                    status => Ok(status),
                };
            }
            (entry.handle.clone(), entry.process.take())
        };

        if let Some(mut process) = process {
            self.stop_group(&handle, process.as_mut());
        }

        let poller = StabilityPoller::new(
            self.clock.clone(),
            self.config.poll_interval,
            self.config.stable_window,
            self.config.verify_timeout,
        );
        let outcome = poller.wait_stable(&handle.output);
        let final_status = match outcome {
            PollOutcome::Stable => JobStatus::Cancelled,
            PollOutcome::StillChanging | PollOutcome::TimedOut => JobStatus::Runaway,
        };
        if let Some(entry) = self.jobs.lock().get_mut(&job) {
            entry.status = final_status;
        }

        if final_status == JobStatus::Cancelled {
            self.base.audit().append(
                AuditEventType::ExportCancelled,
                json!({
                    "job": job.to_string(),
                    "session": handle.session.as_str(),
                    "output": handle.output,
                    "outcome": outcome,
                }),
            );
            info!(job = %job, "Export cancelled and verified stopped");
            return Ok(final_status);
        }

        let reason = HardStopReason::JobDidNotStop(job);
        self.base.audit().append(
            AuditEventType::HardStop,
            json!({
                "job": job.to_string(),
                "session": handle.session.as_str(),
                "output": handle.output,
                "outcome": outcome,
                "output_identity": FileIdentity::resolve(&handle.output).ok(),
                "reason": reason.to_string(),
            }),
        );
        error!(job = %job, ?outcome, "Export did not stop after cancellation");
        Err(AuthorityError::HardStop(reason))
    }

    /// Cancel every running job of `session`. Returns the failures.
    pub fn cancel_all(&self, session: &SessionId) -> Vec<AuthorityError> {
        let ids: Vec<JobId> = self
            .jobs
            .lock()
            .values()
            .filter(|e| e.status == JobStatus::Running && &e.handle.session == session)
            .map(|e| e.handle.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.cancel(id).err())
            .collect()
    }

    /// Forget finished jobs of `session`. Runaway jobs are kept as evidence.
    pub fn prune(&self, session: &SessionId) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, e| {
            &e.handle.session != session
                || matches!(e.status, JobStatus::Running | JobStatus::Runaway)
        });
        before - jobs.len()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// SIGTERM, grace, SIGKILL. The group must be empty, not just its leader
    /// reaped, before SIGKILL is skipped.
    fn stop_group(&self, handle: &ExportJobHandle, process: &mut dyn JobProcess) {
        if let Err(err) = process.terminate_group() {
            warn!(job = %handle.id, error = %err, "SIGTERM to export group failed");
        }
        if self.wait_drained(process) {
            return;
        }
        warn!(job = %handle.id, "Export group survived SIGTERM; killing group");
        if let Err(err) = process.kill_group() {
            warn!(job = %handle.id, error = %err, "SIGKILL to export group failed");
        }
        if !self.wait_drained(process) {
            error!(job = %handle.id, pid = handle.pid, "Export group still present after SIGKILL");
        }
    }

    fn wait_drained(&self, process: &mut dyn JobProcess) -> bool {
        let deadline = self.clock.now() + self.config.grace;
        loop {
            if drained(process) {
                return true;
            }
            if self.clock.now() >= deadline {
                return false;
            }
            self.clock.sleep(self.config.poll_interval);
        }
    }
}

/// Leader reaped and no member of its group left.
fn drained(process: &mut dyn JobProcess) -> bool {
    process.try_reap().unwrap_or(false) && !process.group_alive().unwrap_or(true)
}

impl EnforcementGate for ExportJobController {
    fn name(&self) -> &str {
        "export"
    }

    fn handles(&self, capability: Capability) -> bool {
        capability == Capability::RenderExport
    }

    fn enforce(&self, request: &GateRequest) -> Result<GateClearance, AuthorityError> {
        self.base.guarded(self.name(), request, || {
            let output = match (&request.scope, &request.target) {
                (Scope::ExportOutput { path }, RequestTarget::File { path: target })
                    if path == target =>
                {
                    path
                }
                (_, RequestTarget::File { path }) => {
                    return Err(AuthorityError::CapabilityDenied(
                        DenyReason::OutsideBookmark(path.clone()),
                    ))
                }
                _ => {
                    return Err(AuthorityError::CapabilityDenied(
                        DenyReason::TargetMissing("export output".into()),
                    ))
                }
            };
            let parent = output.parent().ok_or_else(|| {
                AuthorityError::CapabilityDenied(DenyReason::TargetMissing(
                    output.display().to_string(),
                ))
            })?;
            let parent = FileIdentity::resolve(parent).map_err(|_| {
                AuthorityError::CapabilityDenied(DenyReason::TargetMissing(
                    parent.display().to_string(),
                ))
            })?;

            let mut clearance = GateClearance::new(self.name(), request);
            clearance.file = Some(parent);
            Ok(clearance)
        })
    }
}

impl RevocationListener for ExportJobController {
    fn listener_name(&self) -> &str {
        "export-jobs"
    }

    fn on_session_end(&self, session: &SessionId, reason: &EndReason) {
        let failures = self.cancel_all(session);
        if !failures.is_empty() {
            error!(
                session = %session,
                reason = %reason,
                runaway = failures.len(),
                "Export jobs survived session end"
            );
        }
        let pruned = self.prune(session);
        debug!(session = %session, pruned, "Finished export jobs pruned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::DialogWatcher;
    use crate::mocks::{MockDialogProbe, MockJobBehavior, MockJobLauncher};
    use custody_audit::AuditLog;
    use custody_session::SessionContext;
    use custody_types::{GrantId, ManualClock, SystemClock};

    struct Fixture {
        controller: ExportJobController,
        launcher: Arc<MockJobLauncher>,
        session: Arc<SessionContext>,
        audit: Arc<AuditLog>,
        id: SessionId,
        dir: tempfile::TempDir,
    }

    fn fixture(behavior: MockJobBehavior, clock: Arc<dyn Clock>, config: ExportConfig) -> Fixture {
        let audit = Arc::new(AuditLog::new());
        let session = Arc::new(SessionContext::new(audit.clone(), clock.clone()));
        let id = SessionId::from("ses-export");
        session.bind(id.clone()).unwrap();
        let watcher = Arc::new(DialogWatcher::new(
            Arc::new(MockDialogProbe::new()),
            clock.clone(),
        ));
        let base = GateBase::new(session.clone(), watcher, audit.clone());
        let launcher = Arc::new(MockJobLauncher::new(behavior));
        Fixture {
            controller: ExportJobController::new(base, launcher.clone(), clock, config),
            launcher,
            session,
            audit,
            id,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn manual() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new())
    }

    fn request(id: &SessionId, output: &std::path::Path) -> (GateRequest, JobSpec) {
        let request = GateRequest {
            session: id.clone(),
            capability: Capability::RenderExport,
            scope: Scope::ExportOutput {
                path: output.to_path_buf(),
            },
            grant: GrantId::new(),
            target: RequestTarget::File {
                path: output.to_path_buf(),
            },
            consent_satisfied: true,
        };
        let spec = JobSpec {
            program: "/usr/bin/render".into(),
            args: vec!["--out".into(), output.display().to_string()],
            output: output.to_path_buf(),
        };
        (request, spec)
    }

    #[test]
    fn gate_and_listener_names_stay_distinct() {
        let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
        assert_eq!(EnforcementGate::name(&f.controller), "export");
        assert_eq!(f.controller.name(), "export");
        assert_eq!(f.controller.listener_name(), "export-jobs");
    }

    #[test]
    fn start_launches_and_audits() {
        let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);

        let handle = f.controller.start(&req, &spec).unwrap();
        assert_eq!(f.controller.status(handle.id), Some(JobStatus::Running));
        assert_eq!(f.launcher.launched(), 1);
        assert_eq!(f.audit.count_of(AuditEventType::ExportStarted), 1);
    }

    #[test]
    fn output_must_match_scope() {
        let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
        let out = f.dir.path().join("mix.wav");
        let (req, mut spec) = request(&f.id, &out);
        spec.output = f.dir.path().join("elsewhere.wav");

        let err = f.controller.start(&req, &spec).unwrap_err();
        assert_eq!(err.category(), "CAPABILITY_DENIED");
        assert_eq!(f.launcher.launched(), 0);
    }

    #[test]
    fn missing_output_directory_is_denied() {
        let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
        let out = f.dir.path().join("nope").join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        assert!(f.controller.start(&req, &spec).is_err());
    }

    #[test]
    fn cooperative_job_cancels_on_sigterm() {
        let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = f.controller.start(&req, &spec).unwrap();

        assert_eq!(f.controller.cancel(handle.id).unwrap(), JobStatus::Cancelled);
        assert_eq!(f.launcher.signals(), vec!["TERM".to_string()]);
        assert_eq!(f.audit.count_of(AuditEventType::ExportCancelled), 1);
        // Second cancel is a no-op.
        assert_eq!(f.controller.cancel(handle.id).unwrap(), JobStatus::Cancelled);
        assert_eq!(f.audit.count_of(AuditEventType::ExportCancelled), 1);
    }

    #[test]
    fn stubborn_job_gets_sigkill() {
        let f = fixture(MockJobBehavior::IgnoresTerm, manual(), ExportConfig::default());
        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = f.controller.start(&req, &spec).unwrap();

        assert_eq!(f.controller.cancel(handle.id).unwrap(), JobStatus::Cancelled);
        assert_eq!(
            f.launcher.signals(),
            vec!["TERM".to_string(), "KILL".to_string()]
        );
    }

    #[test]
    fn growing_output_after_cancel_is_hard_stop() {
        let config = ExportConfig {
            grace: Duration::from_millis(50),
            poll_interval: Duration::from_millis(20),
            stable_window: Duration::from_millis(150),
            verify_timeout: Duration::from_millis(500),
        };
        let f = fixture(
            MockJobBehavior::Runaway {
                write_every: Duration::from_millis(5),
            },
            Arc::new(SystemClock),
            config,
        );
        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = f.controller.start(&req, &spec).unwrap();

        let err = f.controller.cancel(handle.id).unwrap_err();
        f.launcher.stop_all();

        assert_eq!(
            err,
            AuthorityError::HardStop(HardStopReason::JobDidNotStop(handle.id))
        );
        assert_eq!(f.controller.status(handle.id), Some(JobStatus::Runaway));
        assert_eq!(f.audit.count_of(AuditEventType::HardStop), 1);
        assert_eq!(f.audit.count_of(AuditEventType::ExportCancelled), 0);
        assert!(f.audit.verify_chain().valid);
    }

    #[test]
    fn session_end_cancels_jobs() {
        let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
        let controller = Arc::new(f.controller);
        let weak: std::sync::Weak<dyn RevocationListener> = Arc::downgrade(&controller) as _;
        f.session.register_listener(weak);

        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = controller.start(&req, &spec).unwrap();

        f.session.end(EndReason::Terminated);
        assert_eq!(f.launcher.signals(), vec!["TERM".to_string()]);
        assert_eq!(f.audit.count_of(AuditEventType::ExportCancelled), 1);
        assert!(controller.running().is_empty());
        // Finished jobs of the ended session are forgotten.
        assert_eq!(controller.status(handle.id), None);
        assert_eq!(controller.job_count(), 0);
    }

    #[test]
    fn exited_job_is_noticed() {
        let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = f.controller.start(&req, &spec).unwrap();

        f.launcher.finish_all();
        assert_eq!(f.controller.status(handle.id), Some(JobStatus::Exited));
        assert_eq!(f.controller.cancel(handle.id).unwrap(), JobStatus::Exited);
        assert!(f.launcher.signals().is_empty());
    }

    #[test]
    fn workers_surviving_sigterm_get_sigkill() {
        let f = fixture(MockJobBehavior::WorkerIgnoresTerm, manual(), ExportConfig::default());
        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = f.controller.start(&req, &spec).unwrap();

        assert_eq!(f.controller.cancel(handle.id).unwrap(), JobStatus::Cancelled);
        assert_eq!(
            f.launcher.signals(),
            vec!["TERM".to_string(), "KILL".to_string()]
        );
    }

    #[test]
    fn job_whose_leader_exited_is_still_running() {
        let f = fixture(MockJobBehavior::LeaderExits, manual(), ExportConfig::default());
        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = f.controller.start(&req, &spec).unwrap();

        assert_eq!(f.controller.status(handle.id), Some(JobStatus::Running));
        assert_eq!(f.controller.running().len(), 1);

        assert_eq!(f.controller.cancel(handle.id).unwrap(), JobStatus::Cancelled);
        assert_eq!(f.launcher.signals(), vec!["TERM".to_string()]);
        assert_eq!(f.audit.count_of(AuditEventType::ExportCancelled), 1);
    }

    #[test]
    fn session_end_reaches_workers_of_an_exited_leader() {
        let f = fixture(MockJobBehavior::LeaderExits, manual(), ExportConfig::default());
        let controller = Arc::new(f.controller);
        let weak: std::sync::Weak<dyn RevocationListener> = Arc::downgrade(&controller) as _;
        f.session.register_listener(weak);

        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        controller.start(&req, &spec).unwrap();

        f.session.end(EndReason::Explicit);
        assert_eq!(f.launcher.signals(), vec!["TERM".to_string()]);
        assert_eq!(f.audit.count_of(AuditEventType::ExportCancelled), 1);
        assert_eq!(controller.job_count(), 0);
    }

    #[test]
    fn runaway_job_is_kept_after_session_end() {
        let config = ExportConfig {
            grace: Duration::from_millis(50),
            poll_interval: Duration::from_millis(20),
            stable_window: Duration::from_millis(150),
            verify_timeout: Duration::from_millis(500),
        };
        let f = fixture(
            MockJobBehavior::Runaway {
                write_every: Duration::from_millis(5),
            },
            Arc::new(SystemClock),
            config,
        );
        let controller = Arc::new(f.controller);
        let weak: std::sync::Weak<dyn RevocationListener> = Arc::downgrade(&controller) as _;
        f.session.register_listener(weak);

        let out = f.dir.path().join("mix.wav");
        let (req, spec) = request(&f.id, &out);
        let handle = controller.start(&req, &spec).unwrap();

        f.session.end(EndReason::Explicit);
        f.launcher.stop_all();
        assert_eq!(controller.status(handle.id), Some(JobStatus::Runaway));
        assert_eq!(controller.job_count(), 1);
    }

    #[cfg(unix)]
    mod real_groups {
        use super::*;
        use crate::process::ProcessGroupLauncher;

        fn controller(f: &Fixture) -> ExportJobController {
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let watcher = Arc::new(DialogWatcher::new(
                Arc::new(MockDialogProbe::new()),
                clock.clone(),
            ));
            ExportJobController::new(
                GateBase::new(f.session.clone(), watcher, f.audit.clone()),
                Arc::new(ProcessGroupLauncher),
                clock,
                ExportConfig {
                    grace: Duration::from_millis(300),
                    poll_interval: Duration::from_millis(20),
                    stable_window: Duration::from_millis(200),
                    verify_timeout: Duration::from_secs(3),
                },
            )
        }

        fn shell(out: &std::path::Path, script: &str) -> JobSpec {
            JobSpec {
                program: "/bin/sh".into(),
                args: vec!["-c".into(), script.into(), out.display().to_string()],
                output: out.to_path_buf(),
            }
        }

        fn len(path: &std::path::Path) -> u64 {
            std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
        }

        fn assert_quiet(out: &std::path::Path) {
            let before = len(out);
            std::thread::sleep(Duration::from_millis(300));
            assert_eq!(len(out), before, "output still growing after cancel");
        }

        #[test]
        fn worker_left_by_an_exited_leader_is_stopped() {
            let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
            let controller = controller(&f);
            let out = f.dir.path().join("mix.wav");
            let (req, _) = request(&f.id, &out);
            let spec = shell(
                &out,
                "(while true; do echo x >> \"$0\"; sleep 0.02; done) & exit 0",
            );

            let handle = controller.start(&req, &spec).unwrap();
            std::thread::sleep(Duration::from_millis(150));
            assert_eq!(controller.status(handle.id), Some(JobStatus::Running));

            assert_eq!(controller.cancel(handle.id).unwrap(), JobStatus::Cancelled);
            assert_quiet(&out);
        }

        #[test]
        fn worker_ignoring_sigterm_is_killed() {
            let f = fixture(MockJobBehavior::Cooperative, manual(), ExportConfig::default());
            let controller = controller(&f);
            let out = f.dir.path().join("mix.wav");
            let (req, _) = request(&f.id, &out);
            let spec = shell(
                &out,
                "(trap '' TERM; while true; do echo x >> \"$0\"; sleep 0.02; done) & wait",
            );

            let handle = controller.start(&req, &spec).unwrap();
            std::thread::sleep(Duration::from_millis(150));

            assert_eq!(controller.cancel(handle.id).unwrap(), JobStatus::Cancelled);
            assert_quiet(&out);
        }
    }
}
