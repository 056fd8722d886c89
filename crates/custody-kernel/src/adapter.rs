//! The kernel's single entry point.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use custody_audit::{AuditEventType, AuditLog};
use custody_authority::{
    CapabilityAuthority, ChallengeKind, ConsentChallenge, ConsentCheckpoint, ConsentReceipt,
    ReceiptBook,
};
use custody_confirm::{ConfirmationContext, ConfirmationMachine, ExecutionTicket};
use custody_gates::{
    DialogProbe, DialogWatcher, EnforcementGate, ExportJobController, ExportJobHandle,
    FieldClassifier, FileGate, GateBase, GateRequest, JobLauncher, JobSpec, JobStatus, UiGate,
    UserSelection, WindowProbe,
};
use custody_session::{
    EndReason, LifecycleEvent, PhaseMachine, RevocationListener, SessionContext, SessionPhase,
    SessionTtl, SilenceTracker,
};
use custody_types::{
    AuthorityError, BookmarkId, Capability, CapabilityFamily, CapabilityGrant, Clock,
    ConsentFailure, ConsentTokenId, DenyReason, GrantId, HardStopReason, JobId, Scope, SessionId,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::KernelConfig;
use crate::error::ConfigError;
use crate::guard::{ExecutionGuard, SESSION_TTL};
use crate::traits::{EffectActuator, PolicyEvaluator};
use crate::types::{
    Authorization, AuthorizedEffect, CapabilityRequest, ContextBoundary, EffectOutcome,
    ProposedAction,
};

/// Host-provided collaborators.
pub struct Platform {
    pub clock: Arc<dyn Clock>,
    pub dialogs: Arc<dyn DialogProbe>,
    pub windows: Arc<dyn WindowProbe>,
    pub classifier: Option<Arc<dyn FieldClassifier>>,
    pub launcher: Arc<dyn JobLauncher>,
    pub policy: Option<Arc<dyn PolicyEvaluator>>,
    pub actuator: Arc<dyn EffectActuator>,
}

/// A consent checkpoint forced by the execution guard.
#[derive(Clone, Debug)]
pub struct PendingCheckpoint {
    pub challenge: ConsentChallenge,
    pub scope: Scope,
    /// The challenge token was spent (dismissed or failed) and must be reopened.
    pub spent: bool,
}

/// Resets session-scoped timers, phase and boundary when the session ends.
struct SessionTimers {
    phase: Arc<PhaseMachine>,
    ttl: Arc<SessionTtl>,
    silence: Arc<SilenceTracker>,
    guard: Arc<ExecutionGuard>,
    checkpoint: Arc<Mutex<Option<PendingCheckpoint>>>,
}

impl RevocationListener for SessionTimers {
    fn listener_name(&self) -> &str {
        "session-timers"
    }

    fn on_session_end(&self, _session: &SessionId, reason: &EndReason) {
        self.phase.halt_and_reset(&reason.to_string());
        self.ttl.clear();
        self.silence.reset();
        self.guard.clear_boundary();
        self.checkpoint.lock().take();
    }
}

/// Mediates every privileged action an agent attempts.
///
/// Composes session binding, grants, consent checkpoints, confirmation
/// machines, enforcement gates and the execution guard. Any hard stop ends the
/// session before the error is returned.
pub struct EnforcementAdapter {
    config: KernelConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLog>,
    session: Arc<SessionContext>,
    phase: Arc<PhaseMachine>,
    ttl: Arc<SessionTtl>,
    silence: Arc<SilenceTracker>,
    authority: Arc<CapabilityAuthority>,
    consent: Arc<ConsentCheckpoint>,
    ui: Arc<UiGate>,
    files: Arc<FileGate>,
    exports: Arc<ExportJobController>,
    // Registered weakly with the session; owned here.
    _timers: Arc<SessionTimers>,
    guard: Arc<ExecutionGuard>,
    actuator: Arc<dyn EffectActuator>,
    checkpoint: Arc<Mutex<Option<PendingCheckpoint>>>,
}

fn weak<T: RevocationListener + 'static>(listener: &Arc<T>) -> Weak<dyn RevocationListener> {
    let listener: Arc<dyn RevocationListener> = listener.clone();
    Arc::downgrade(&listener)
}

impl EnforcementAdapter {
    pub fn new(config: KernelConfig, platform: Platform) -> Result<Self, ConfigError> {
        config.validate()?;

        let clock = platform.clock;
        let audit = Arc::new(AuditLog::new());
        let session = Arc::new(SessionContext::new(audit.clone(), clock.clone()));
        let phase = Arc::new(PhaseMachine::new(audit.clone()));
        let ttl = Arc::new(SessionTtl::new(clock.clone(), config.session_ttl()));
        let silence = Arc::new(SilenceTracker::new(clock.clone(), config.silence_timeout()));

        let receipts = Arc::new(ReceiptBook::new());
        let authority = Arc::new(CapabilityAuthority::new(
            session.clone(),
            audit.clone(),
            clock.clone(),
            receipts.clone(),
        ));
        let consent = Arc::new(ConsentCheckpoint::new(
            session.clone(),
            audit.clone(),
            clock.clone(),
            receipts,
            config.token_ttl(),
        ));

        let dialogs = Arc::new(DialogWatcher::new(platform.dialogs, clock.clone()));
        let base = GateBase::new(session.clone(), dialogs, audit.clone());
        let mut ui = UiGate::new(base.clone(), platform.windows);
        if let Some(classifier) = platform.classifier {
            ui = ui.with_classifier(classifier);
        }
        let ui = Arc::new(ui);
        let files = Arc::new(FileGate::new(base.clone()));
        let exports = Arc::new(ExportJobController::new(
            base,
            platform.launcher,
            clock.clone(),
            config.export_config(),
        ));

        let guard = Arc::new(ExecutionGuard::new(
            phase.clone(),
            ttl.clone(),
            silence.clone(),
            platform.policy,
            audit.clone(),
            config.session.confidence_floor,
        ));

        let checkpoint = Arc::new(Mutex::new(None));
        let timers = Arc::new(SessionTimers {
            phase: phase.clone(),
            ttl: ttl.clone(),
            silence: silence.clone(),
            guard: guard.clone(),
            checkpoint: checkpoint.clone(),
        });

        // Jobs first so nothing keeps writing while the rest is torn down.
        session.register_listener(weak(&exports));
        session.register_listener(weak(&authority));
        session.register_listener(weak(&consent));
        session.register_listener(weak(&files));
        session.register_listener(weak(&ui));
        session.register_listener(weak(&timers));

        Ok(Self {
            config,
            clock,
            audit,
            session,
            phase,
            ttl,
            silence,
            authority,
            consent,
            ui,
            files,
            exports,
            _timers: timers,
            guard,
            actuator: platform.actuator,
            checkpoint,
        })
    }

    // Sessions

    /// Bind `id` and move to `Requested`. Rebinding the same id is a no-op.
    pub fn open_session(&self, id: SessionId) -> Result<(), AuthorityError> {
        self.session.bind(id)?;
        if self.phase.current() == SessionPhase::Inactive {
            self.phase
                .transition(SessionPhase::Requested, "session opened")?;
        }
        Ok(())
    }

    /// The human's explicit start: `Requested -> ConsentGranted -> Executing`.
    pub fn confirm_session(&self, id: &SessionId) -> Result<(), AuthorityError> {
        self.session.assert_session(id)?;
        self.phase
            .transition(SessionPhase::ConsentGranted, "user confirmed session")?;
        self.phase
            .transition(SessionPhase::Executing, "execution started")?;
        self.ttl.start();
        self.silence.record_user_action();
        info!(session = %id, "Session confirmed by user");
        Ok(())
    }

    /// Finish cleanly: `Executing -> Completed`, then end the session.
    pub fn complete_session(&self, id: &SessionId) -> Result<(), AuthorityError> {
        self.session.assert_session(id)?;
        self.phase
            .transition(SessionPhase::Completed, "work completed")?;
        self.session.end(EndReason::Explicit);
        Ok(())
    }

    pub fn handle_lifecycle(&self, event: &LifecycleEvent) -> Option<SessionId> {
        self.session.handle_lifecycle(event)
    }

    pub fn end_session(&self, reason: EndReason) -> Option<SessionId> {
        self.session.end(reason)
    }

    /// Pin the file, tool and modality the session works in. Requests that
    /// report a different context fail the execution guard.
    pub fn bind_boundary(
        &self,
        session: &SessionId,
        boundary: ContextBoundary,
    ) -> Result<(), AuthorityError> {
        self.session.assert_session(session)?;
        self.guard.bind_boundary(boundary);
        Ok(())
    }

    pub fn boundary(&self) -> Option<ContextBoundary> {
        self.guard.boundary()
    }

    /// An explicit human action. Resets the silence timer.
    pub fn record_user_action(&self) {
        self.silence.record_user_action();
    }

    // Grants and bookmarks

    /// Grant `capability` over `scope`. `ttl` defaults to the configured grant lifetime.
    pub fn grant(
        &self,
        session: &SessionId,
        capability: Capability,
        scope: Scope,
        ttl: Option<Duration>,
        requires_consent: bool,
    ) -> Result<CapabilityGrant, AuthorityError> {
        self.authority.grant(
            session,
            capability,
            scope,
            ttl.unwrap_or_else(|| self.config.default_grant_ttl()),
            requires_consent,
        )
    }

    pub fn revoke(&self, grant: GrantId) -> bool {
        self.authority.revoke(grant)
    }

    pub fn bookmark(
        &self,
        session: &SessionId,
        selection: UserSelection,
    ) -> Result<BookmarkId, AuthorityError> {
        self.files.bookmark(session, selection)
    }

    // Authorization

    /// Check a request against grants and its enforcement gate.
    pub fn request(&self, mut request: CapabilityRequest) -> Result<Authorization, AuthorityError> {
        let (grant, consented) = self.decide(&mut request)?;
        let gate_request = gate_request(&request, &grant, consented);
        let clearance = self
            .gate_for(request.capability)
            .enforce(&gate_request)
            .map_err(|err| self.escalate(err))?;
        Ok(Authorization {
            grant,
            clearance,
            consented,
        })
    }

    fn decide(
        &self,
        request: &mut CapabilityRequest,
    ) -> Result<(CapabilityGrant, bool), AuthorityError> {
        if let Some(grant) = request.grant {
            self.authority.check_grant(&request.session, grant)?;
        }
        self.authority
            .check(
                &request.session,
                request.capability,
                &request.scope,
                request.receipt.take(),
            )
            .into_result()
    }

    fn gate_for(&self, capability: Capability) -> &dyn EnforcementGate {
        match capability.family() {
            CapabilityFamily::Ui => self.ui.as_ref(),
            CapabilityFamily::File => self.files.as_ref(),
            CapabilityFamily::Export => self.exports.as_ref(),
        }
    }

    /// A hard stop ends the session before the error reaches the caller.
    fn escalate(&self, err: AuthorityError) -> AuthorityError {
        if let AuthorityError::HardStop(reason) = &err {
            // The export controller records its own evidence for runaway jobs.
            if !matches!(reason, HardStopReason::JobDidNotStop(_)) {
                self.audit.append(
                    AuditEventType::HardStop,
                    json!({
                        "session": self.session.current().map(|s| s.0),
                        "reason": reason.to_string(),
                    }),
                );
            }
            error!(reason = %reason, "Hard stop; ending session");
            self.session.end(EndReason::HardStop(reason.clone()));
        }
        err
    }

    fn expire_session(&self, session: &SessionId) -> AuthorityError {
        let reason = HardStopReason::SessionExpired;
        self.audit.append(
            AuditEventType::HardStop,
            json!({ "session": session.as_str(), "reason": reason.to_string() }),
        );
        error!(session = %session, "Session lifetime exceeded; ending session");
        self.session.end(EndReason::TtlExpired);
        AuthorityError::HardStop(reason)
    }

    // Consent

    /// Issue a consent challenge for the live grant covering `capability` over `scope`.
    pub fn issue_consent(
        &self,
        session: &SessionId,
        capability: Capability,
        scope: &Scope,
        reason: &str,
        kind: Option<ChallengeKind>,
    ) -> Result<ConsentChallenge, AuthorityError> {
        self.session.assert_session(session)?;
        let grant = self
            .authority
            .matching_grant(session, capability, scope)
            .ok_or(AuthorityError::CapabilityDenied(DenyReason::NoGrant(capability)))?;
        self.consent.issue(
            session,
            capability,
            grant.id,
            reason,
            kind.unwrap_or(self.config.consent.default_kind),
        )
    }

    /// Validate a challenge response. Responding is an explicit user action.
    pub fn validate_consent(
        &self,
        session: &SessionId,
        capability: Capability,
        token: ConsentTokenId,
        response: &str,
    ) -> Result<ConsentReceipt, AuthorityError> {
        let receipt = self.consent.validate(session, capability, token, response)?;
        self.silence.record_user_action();
        Ok(receipt)
    }

    /// The checkpoint the guard is waiting on, if any.
    pub fn checkpoint(&self) -> Option<PendingCheckpoint> {
        self.checkpoint.lock().clone()
    }

    fn open_checkpoint(
        &self,
        request: &CapabilityRequest,
        reason: &str,
    ) -> Result<ConsentChallenge, AuthorityError> {
        let challenge = self.issue_consent(
            &request.session,
            request.capability,
            &request.scope,
            reason,
            None,
        )?;
        self.phase.transition(SessionPhase::Checkpoint, reason)?;
        *self.checkpoint.lock() = Some(PendingCheckpoint {
            challenge: challenge.clone(),
            scope: request.scope.clone(),
            spent: false,
        });
        warn!(session = %request.session, token = %challenge.token, reason, "Execution paused at checkpoint");
        Ok(challenge)
    }

    /// Answer the pending checkpoint. Success resumes execution; any failure
    /// pauses it.
    pub fn resume_after_checkpoint(
        &self,
        session: &SessionId,
        token: ConsentTokenId,
        response: &str,
    ) -> Result<ConsentReceipt, AuthorityError> {
        let pending = self
            .checkpoint
            .lock()
            .clone()
            .filter(|p| p.challenge.token == token && !p.spent)
            .ok_or(AuthorityError::ConsentInvalid(ConsentFailure::Unknown(token)))?;

        match self
            .consent
            .validate(session, pending.challenge.capability, token, response)
        {
            Ok(receipt) => {
                self.checkpoint.lock().take();
                self.silence.record_user_action();
                self.phase
                    .transition(SessionPhase::Executing, "checkpoint passed")?;
                Ok(receipt)
            }
            Err(err) => {
                self.pause_checkpoint("checkpoint failed");
                Err(err)
            }
        }
    }

    /// Dismiss the pending checkpoint. Execution pauses; it never resumes on its own.
    pub fn dismiss_checkpoint(&self, token: ConsentTokenId) -> Result<(), AuthorityError> {
        self.consent.dismiss(token)?;
        self.pause_checkpoint("checkpoint dismissed");
        Ok(())
    }

    fn pause_checkpoint(&self, reason: &str) {
        if let Some(pending) = self.checkpoint.lock().as_mut() {
            pending.spent = true;
        }
        if self.phase.current() == SessionPhase::Checkpoint {
            let _ = self.phase.transition(SessionPhase::Paused, reason);
        }
    }

    /// From `Paused`, present a fresh challenge for the same checkpoint.
    pub fn reopen_checkpoint(
        &self,
        session: &SessionId,
        kind: Option<ChallengeKind>,
    ) -> Result<ConsentChallenge, AuthorityError> {
        self.session.assert_session(session)?;
        let pending = self
            .checkpoint
            .lock()
            .clone()
            .filter(|p| p.spent)
            .ok_or_else(|| AuthorityError::IllegalTransition {
                from: self.phase.current().to_string(),
                to: SessionPhase::Checkpoint.to_string(),
            })?;
        let challenge = self.issue_consent(
            session,
            pending.challenge.capability,
            &pending.scope,
            "checkpoint reopened",
            kind,
        )?;
        self.phase
            .transition(SessionPhase::Checkpoint, "checkpoint reopened")?;
        *self.checkpoint.lock() = Some(PendingCheckpoint {
            challenge: challenge.clone(),
            scope: pending.scope,
            spent: false,
        });
        Ok(challenge)
    }

    // Confirmation and execution

    /// Bind a confirmation machine to `action`.
    pub fn propose(
        &self,
        session: &SessionId,
        action: &ProposedAction,
    ) -> Result<ConfirmationMachine, AuthorityError> {
        self.session.assert_session(session)?;
        let context = ConfirmationContext::new(session.clone(), &action.canonical_bytes());
        Ok(ConfirmationMachine::new(
            context,
            self.config.confirmation_config(),
            self.clock.clone(),
            self.audit.clone(),
        ))
    }

    /// Execution guard, then ticket check, then grant and gate checks.
    fn preflight(
        &self,
        request: &mut CapabilityRequest,
        action: &ProposedAction,
        ticket: Option<ExecutionTicket>,
    ) -> Result<(CapabilityGrant, bool), AuthorityError> {
        self.session.assert_session(&request.session)?;

        let report = self.guard.evaluate(request, action);
        if report.failed(SESSION_TTL) {
            return Err(self.expire_session(&request.session));
        }
        if report.only_silence() {
            let challenge = self.open_checkpoint(request, "silence timeout")?;
            return Err(AuthorityError::ConsentRequired {
                capability: request.capability,
                token: Some(challenge.token),
            });
        }
        if !report.passed() {
            return Err(AuthorityError::GuardViolation {
                failed: report.failed,
            });
        }

        self.check_ticket(request, action, ticket)?;
        self.decide(request)
    }

    fn check_ticket(
        &self,
        request: &CapabilityRequest,
        action: &ProposedAction,
        ticket: Option<ExecutionTicket>,
    ) -> Result<(), AuthorityError> {
        let problem = match ticket {
            None if request.capability.is_irreversible() => Some("confirmation required"),
            None => None,
            Some(ticket) if ticket.session() != &request.session => {
                Some("ticket issued for another session")
            }
            Some(ticket) if !ticket.covers(&action.canonical_bytes()) => {
                Some("action changed after confirmation")
            }
            Some(_) => None,
        };
        match problem {
            None => Ok(()),
            Some(problem) => {
                self.audit.append(
                    AuditEventType::CapabilityDenied,
                    json!({
                        "session": request.session.as_str(),
                        "capability": request.capability,
                        "action": action.action_type,
                        "detail": problem,
                    }),
                );
                warn!(session = %request.session, capability = %request.capability, problem, "Execution ticket rejected");
                Err(AuthorityError::CapabilityDenied(DenyReason::Ticket(
                    problem.to_string(),
                )))
            }
        }
    }

    /// Perform `action` under `request`.
    ///
    /// Irreversible capabilities need the ticket from a confirmation machine
    /// bound to this exact action.
    pub async fn execute(
        &self,
        mut request: CapabilityRequest,
        action: ProposedAction,
        ticket: Option<ExecutionTicket>,
    ) -> Result<EffectOutcome, AuthorityError> {
        let (grant, consented) = self.preflight(&mut request, &action, ticket)?;
        let clearance = self
            .gate_for(request.capability)
            .enforce(&gate_request(&request, &grant, consented))
            .map_err(|err| self.escalate(err))?;

        let effect = AuthorizedEffect {
            session: request.session.clone(),
            capability: request.capability,
            grant: grant.id,
            action,
            clearance,
            authorized_at: Utc::now(),
        };
        self.audit.append(
            AuditEventType::EffectDispatched,
            json!({
                "session": effect.session.as_str(),
                "capability": effect.capability,
                "grant": effect.grant.to_string(),
                "action": effect.action,
            }),
        );
        info!(session = %effect.session, capability = %effect.capability, action = %effect.action.action_type, "Effect dispatched");

        let capability = effect.capability;
        match self.actuator.actuate(effect).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.audit.append(
                    AuditEventType::EffectFailed,
                    json!({ "capability": capability, "error": err.to_string() }),
                );
                warn!(capability = %capability, error = %err, "Effect failed");
                Err(err.into())
            }
        }
    }

    // Exports

    /// Start an export. The ticket must come from confirming
    /// [`ProposedAction::export`] for this `spec`.
    pub fn start_export(
        &self,
        mut request: CapabilityRequest,
        spec: &JobSpec,
        ticket: Option<ExecutionTicket>,
    ) -> Result<ExportJobHandle, AuthorityError> {
        let action = ProposedAction::export(spec);
        let (grant, consented) = self.preflight(&mut request, &action, ticket)?;
        self.exports
            .start(&gate_request(&request, &grant, consented), spec)
            .map_err(|err| self.escalate(err))
    }

    /// Cancel an export and verify it stopped. A runaway job is a hard stop.
    pub fn cancel_export(&self, job: JobId) -> Result<JobStatus, AuthorityError> {
        self.exports.cancel(job).map_err(|err| self.escalate(err))
    }

    /// [`Self::cancel_export`] off the async executor. Signalling and the
    /// stability poll block for up to the grace period plus the verify timeout.
    pub async fn cancel_export_async(&self, job: JobId) -> Result<JobStatus, AuthorityError> {
        let exports = self.exports.clone();
        let result = tokio::task::spawn_blocking(move || exports.cancel(job))
            .await
            .map_err(|err| AuthorityError::Io(format!("export cancellation task failed: {}", err)))?;
        result.map_err(|err| self.escalate(err))
    }

    pub fn export_status(&self, job: JobId) -> Option<JobStatus> {
        self.exports.status(job)
    }

    // Introspection

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.current()
    }

    pub fn authority(&self) -> &Arc<CapabilityAuthority> {
        &self.authority
    }

    pub fn consent(&self) -> &Arc<ConsentCheckpoint> {
        &self.consent
    }

    pub fn ui_gate(&self) -> &Arc<UiGate> {
        &self.ui
    }

    pub fn file_gate(&self) -> &Arc<FileGate> {
        &self.files
    }

    pub fn session_ttl_remaining(&self) -> Duration {
        self.ttl.remaining()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Number of live revocation listeners. Every component registers one.
    pub fn listener_count(&self) -> usize {
        self.session.listener_count()
    }
}

fn gate_request(request: &CapabilityRequest, grant: &CapabilityGrant, consented: bool) -> GateRequest {
    GateRequest {
        session: request.session.clone(),
        capability: request.capability,
        scope: request.scope.clone(),
        grant: grant.id,
        target: request.target.clone(),
        consent_satisfied: consented,
    }
}
