use std::sync::Arc;

use custody_audit::{AuditEventType, AuditLog};
use custody_session::{PhaseMachine, SessionTtl, SilenceTracker};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};

use crate::traits::PolicyEvaluator;
use crate::types::{CapabilityRequest, ContextBoundary, ProposedAction};

pub const IN_EXECUTING_PHASE: &str = "in_executing_phase";
pub const SESSION_TTL: &str = "session_ttl";
pub const SILENCE: &str = "silence";
pub const BOUNDARY_NOT_CROSSED: &str = "boundary_not_crossed";
pub const CONFIDENCE_NOT_DEGRADED: &str = "confidence_not_degraded";

/// Which preconditions failed. Empty means execution may proceed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardReport {
    pub failed: Vec<String>,
}

impl GuardReport {
    pub fn passed(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed(&self, condition: &str) -> bool {
        self.failed.iter().any(|f| f == condition)
    }

    /// Silence is the only problem, so a checkpoint can resolve it.
    pub fn only_silence(&self) -> bool {
        self.failed.len() == 1 && self.failed(SILENCE)
    }
}

/// Checks every execution precondition before an effect leaves the kernel.
///
/// All conditions are evaluated and every failure is reported; none
/// short-circuits the others.
pub struct ExecutionGuard {
    phase: Arc<PhaseMachine>,
    ttl: Arc<SessionTtl>,
    silence: Arc<SilenceTracker>,
    policy: Option<Arc<dyn PolicyEvaluator>>,
    audit: Arc<AuditLog>,
    confidence_floor: f64,
    boundary: Mutex<Option<ContextBoundary>>,
}

impl ExecutionGuard {
    pub fn new(
        phase: Arc<PhaseMachine>,
        ttl: Arc<SessionTtl>,
        silence: Arc<SilenceTracker>,
        policy: Option<Arc<dyn PolicyEvaluator>>,
        audit: Arc<AuditLog>,
        confidence_floor: f64,
    ) -> Self {
        Self {
            phase,
            ttl,
            silence,
            policy,
            audit,
            confidence_floor,
            boundary: Mutex::new(None),
        }
    }

    /// Pin the context the session works in. Requests that report a
    /// different context fail the guard.
    pub fn bind_boundary(&self, boundary: ContextBoundary) {
        info!(?boundary, "Session boundary bound");
        *self.boundary.lock() = Some(boundary);
    }

    pub fn clear_boundary(&self) {
        self.boundary.lock().take();
    }

    pub fn boundary(&self) -> Option<ContextBoundary> {
        self.boundary.lock().clone()
    }

    pub fn evaluate(&self, request: &CapabilityRequest, action: &ProposedAction) -> GuardReport {
        let mut failed = Vec::new();

        if !self.phase.can_execute() {
            failed.push(IN_EXECUTING_PHASE.to_string());
        }
        if self.ttl.is_expired() {
            failed.push(SESSION_TTL.to_string());
        }
        if self.silence.is_silent() {
            failed.push(SILENCE.to_string());
        }
        let crossed = match (self.boundary.lock().as_ref(), request.context.as_ref()) {
            (Some(bound), Some(current)) => bound.crossed_by(current),
            _ => false,
        };
        if crossed {
            failed.push(BOUNDARY_NOT_CROSSED.to_string());
        }
        if let Some(confidence) = request.confidence {
            if confidence.is_nan() || confidence < self.confidence_floor {
                failed.push(CONFIDENCE_NOT_DEGRADED.to_string());
            }
        }
        if let Some(policy) = &self.policy {
            failed.extend(
                policy
                    .evaluate(request, action)
                    .into_iter()
                    .map(|v| format!("policy:{}", v.policy)),
            );
        }

        let report = GuardReport { failed };
        if !report.passed() {
            warn!(
                session = %request.session,
                capability = %request.capability,
                failed = ?report.failed,
                "Execution guard failed"
            );
            self.audit.append(
                AuditEventType::GuardViolation,
                json!({
                    "session": request.session.as_str(),
                    "capability": request.capability,
                    "action": action.action_type,
                    "phase": self.phase.current(),
                    "failed": report.failed,
                }),
            );
        }
        report
    }
}
