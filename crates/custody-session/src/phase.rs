//! Session phase machine.
//!
//! | From | To |
//! |------|----|
//! | Inactive | Requested |
//! | Requested | Inactive, ConsentGranted |
//! | ConsentGranted | Inactive, Executing, Halted |
//! | Executing | Checkpoint, Halted, Completed |
//! | Checkpoint | Executing, Paused, Halted |
//! | Paused | Checkpoint, Halted, Inactive |
//! | Halted | Inactive |
//! | Completed | Inactive |
//!
//! Only the pairs in [`SessionPhase::legal_targets`] are accepted. Everything
//! else is rejected with [`AuthorityError::IllegalTransition`] and leaves the
//! phase unchanged.

use std::sync::Arc;

use custody_audit::{AuditEventType, AuditLog};
use custody_types::AuthorityError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Inactive,
    Requested,
    ConsentGranted,
    Executing,
    Checkpoint,
    Paused,
    Halted,
    Completed,
}

impl SessionPhase {
    pub const ALL: [SessionPhase; 8] = [
        SessionPhase::Inactive,
        SessionPhase::Requested,
        SessionPhase::ConsentGranted,
        SessionPhase::Executing,
        SessionPhase::Checkpoint,
        SessionPhase::Paused,
        SessionPhase::Halted,
        SessionPhase::Completed,
    ];

    pub fn legal_targets(self) -> &'static [SessionPhase] {
        use SessionPhase::*;
        match self {
            Inactive => &[Requested],
            Requested => &[Inactive, ConsentGranted],
            ConsentGranted => &[Inactive, Executing, Halted],
            Executing => &[Checkpoint, Halted, Completed],
            Checkpoint => &[Executing, Paused, Halted],
            // Re-engagement goes back through a checkpoint; lifetime expiry drops to Inactive.
            Paused => &[Checkpoint, Halted, Inactive],
            Halted => &[Inactive],
            Completed => &[Inactive],
        }
    }

    pub fn can_transition_to(self, to: SessionPhase) -> bool {
        self.legal_targets().contains(&to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Inactive => "INACTIVE",
            SessionPhase::Requested => "REQUESTED",
            SessionPhase::ConsentGranted => "CONSENT_GRANTED",
            SessionPhase::Executing => "EXECUTING",
            SessionPhase::Checkpoint => "CHECKPOINT",
            SessionPhase::Paused => "PAUSED",
            SessionPhase::Halted => "HALTED",
            SessionPhase::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audited holder of the current [`SessionPhase`].
#[derive(Debug)]
pub struct PhaseMachine {
    phase: Mutex<SessionPhase>,
    audit: Arc<AuditLog>,
}

impl PhaseMachine {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            phase: Mutex::new(SessionPhase::Inactive),
            audit,
        }
    }

    pub fn current(&self) -> SessionPhase {
        *self.phase.lock()
    }

    /// Execution proceeds only while `Executing`.
    pub fn can_execute(&self) -> bool {
        self.current() == SessionPhase::Executing
    }

    pub fn transition(&self, to: SessionPhase, reason: &str) -> Result<SessionPhase, AuthorityError> {
        let mut phase = self.phase.lock();
        let from = *phase;
        if !from.can_transition_to(to) {
            tracing::warn!(from = %from, to = %to, reason, "Illegal session phase transition");
            return Err(AuthorityError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        *phase = to;
        self.audit.append(
            AuditEventType::SessionPhaseChanged,
            json!({ "from": from, "to": to, "reason": reason }),
        );
        tracing::info!(from = %from, to = %to, reason, "Session phase changed");
        Ok(from)
    }

    /// Walk to `Halted` (when reachable) and then `Inactive`.
    ///
    /// Used on session end, where the phase must come to rest regardless of
    /// where it was.
    pub fn halt_and_reset(&self, reason: &str) {
        let from = self.current();
        if from == SessionPhase::Inactive {
            return;
        }
        if from.can_transition_to(SessionPhase::Halted) {
            let _ = self.transition(SessionPhase::Halted, reason);
        }
        let _ = self.transition(SessionPhase::Inactive, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn machine() -> (PhaseMachine, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        (PhaseMachine::new(audit.clone()), audit)
    }

    #[test]
    fn happy_path_reaches_executing() {
        let (m, audit) = machine();
        m.transition(SessionPhase::Requested, "open").unwrap();
        m.transition(SessionPhase::ConsentGranted, "confirmed").unwrap();
        m.transition(SessionPhase::Executing, "start").unwrap();
        assert!(m.can_execute());
        assert_eq!(audit.count_of(AuditEventType::SessionPhaseChanged), 3);
    }

    #[test]
    fn illegal_transition_rejected_and_unchanged() {
        let (m, audit) = machine();
        let err = m.transition(SessionPhase::Executing, "skip").unwrap_err();
        assert!(matches!(err, AuthorityError::IllegalTransition { .. }));
        assert_eq!(m.current(), SessionPhase::Inactive);
        assert!(audit.is_empty());
    }

    #[test]
    fn paused_cannot_resume_directly() {
        assert!(!SessionPhase::Paused.can_transition_to(SessionPhase::Executing));
        assert!(SessionPhase::Paused.can_transition_to(SessionPhase::Checkpoint));
    }

    #[test]
    fn halt_and_reset_from_checkpoint() {
        let (m, _) = machine();
        for p in [
            SessionPhase::Requested,
            SessionPhase::ConsentGranted,
            SessionPhase::Executing,
            SessionPhase::Checkpoint,
        ] {
            m.transition(p, "walk").unwrap();
        }
        m.halt_and_reset("session ended");
        assert_eq!(m.current(), SessionPhase::Inactive);
    }

    #[test]
    fn halt_and_reset_from_requested() {
        let (m, _) = machine();
        m.transition(SessionPhase::Requested, "open").unwrap();
        m.halt_and_reset("session ended");
        assert_eq!(m.current(), SessionPhase::Inactive);
    }

    fn phase() -> impl Strategy<Value = SessionPhase> {
        prop::sample::select(SessionPhase::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn only_table_transitions_succeed(targets in prop::collection::vec(phase(), 0..24)) {
            let (m, _) = machine();
            for to in targets {
                let from = m.current();
                let result = m.transition(to, "prop");
                prop_assert_eq!(result.is_ok(), from.can_transition_to(to));
                let expected = if result.is_ok() { to } else { from };
                prop_assert_eq!(m.current(), expected);
            }
        }
    }
}
