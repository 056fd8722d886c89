use chrono::{DateTime, Utc};
use custody_authority::ConsentReceipt;
use custody_gates::{GateClearance, JobSpec, RequestTarget};
use custody_types::{Capability, CapabilityGrant, GrantId, Scope, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The working context a session was started in. Unset fields are not tracked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBoundary {
    pub file: Option<String>,
    pub tool: Option<String>,
    pub modality: Option<String>,
}

impl ContextBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn modality(mut self, modality: impl Into<String>) -> Self {
        self.modality = Some(modality.into());
        self
    }

    /// Whether `current` differs in any field both sides track.
    pub fn crossed_by(&self, current: &ContextBoundary) -> bool {
        fn differs(bound: &Option<String>, current: &Option<String>) -> bool {
            matches!((bound, current), (Some(b), Some(c)) if b != c)
        }
        differs(&self.file, &current.file)
            || differs(&self.tool, &current.tool)
            || differs(&self.modality, &current.modality)
    }
}

/// A request to use one capability once.
#[derive(Debug)]
pub struct CapabilityRequest {
    pub session: SessionId,
    pub capability: Capability,
    pub scope: Scope,
    pub target: RequestTarget,
    /// A specific grant the caller is acting under, if it holds one.
    pub grant: Option<GrantId>,
    /// A consent receipt to redeem with this request.
    pub receipt: Option<ConsentReceipt>,
    /// The context the agent is acting in now.
    pub context: Option<ContextBoundary>,
    /// The agent's confidence in this step, `0.0..=1.0`.
    pub confidence: Option<f64>,
}

impl CapabilityRequest {
    pub fn new(session: SessionId, capability: Capability, scope: Scope) -> Self {
        Self {
            session,
            capability,
            scope,
            target: RequestTarget::None,
            grant: None,
            receipt: None,
            context: None,
            confidence: None,
        }
    }

    pub fn with_target(mut self, target: RequestTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_grant(mut self, grant: GrantId) -> Self {
        self.grant = Some(grant);
        self
    }

    pub fn with_receipt(mut self, receipt: ConsentReceipt) -> Self {
        self.receipt = Some(receipt);
        self
    }

    pub fn with_context(mut self, context: ContextBoundary) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Result of a successful [`crate::EnforcementAdapter::request`].
#[derive(Clone, Debug)]
pub struct Authorization {
    pub grant: CapabilityGrant,
    pub clearance: GateClearance,
    /// A consent receipt was redeemed for this authorization.
    pub consented: bool,
}

/// An action the agent proposes to perform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub action_type: String,
    pub parameters: serde_json::Value,
}

impl ProposedAction {
    pub fn new(action_type: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            action_type: action_type.into(),
            parameters,
        }
    }

    /// The action a RENDER_EXPORT confirmation binds to.
    pub fn export(spec: &JobSpec) -> Self {
        Self::new(
            "render_export",
            json!({
                "program": spec.program,
                "args": spec.args,
                "output": spec.output,
            }),
        )
    }

    /// Canonical bytes a confirmation binds to. Object keys serialize sorted.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        json!({
            "action_type": self.action_type,
            "parameters": self.parameters,
        })
        .to_string()
        .into_bytes()
    }
}

/// Everything an actuator needs to perform one effect.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizedEffect {
    pub session: SessionId,
    pub capability: Capability,
    pub grant: GrantId,
    pub action: ProposedAction,
    pub clearance: GateClearance,
    pub authorized_at: DateTime<Utc>,
}

/// What the actuator reports back.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectOutcome {
    pub summary: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_only_compares_tracked_fields() {
        let bound = ContextBoundary::new().file("/proj/song.als").tool("mixer");
        assert!(!bound.crossed_by(&ContextBoundary::new()));
        assert!(!bound.crossed_by(&ContextBoundary::new().modality("voice")));
        assert!(!bound.crossed_by(&ContextBoundary::new().file("/proj/song.als")));
        assert!(bound.crossed_by(&ContextBoundary::new().tool("browser")));
        assert!(!ContextBoundary::new().crossed_by(&ContextBoundary::new().file("/x")));
    }

    #[test]
    fn canonical_bytes_ignore_key_order() {
        let a = ProposedAction::new("set_gain", json!({ "track": 3, "db": -6.0 }));
        let b = ProposedAction::new("set_gain", json!({ "db": -6.0, "track": 3 }));
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn export_action_binds_output_path() {
        let spec = JobSpec {
            program: "/usr/bin/render".into(),
            args: vec![],
            output: "/tmp/a.wav".into(),
        };
        let mut moved = spec.clone();
        moved.output = "/tmp/b.wav".into();
        assert_ne!(
            ProposedAction::export(&spec).canonical_bytes(),
            ProposedAction::export(&moved).canonical_bytes()
        );
    }

    #[test]
    fn canonical_bytes_change_with_parameters() {
        let a = ProposedAction::new("set_gain", json!({ "db": -6.0 }));
        let b = ProposedAction::new("set_gain", json!({ "db": -3.0 }));
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }
}
