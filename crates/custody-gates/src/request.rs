use std::path::PathBuf;

use custody_types::{
    Capability, FieldClassification, FileIdentity, GrantId, Scope, SessionId, WindowIdentity,
};
use serde::{Deserialize, Serialize};

/// A text field targeted by TEXT_INPUT.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    pub field_id: String,
    /// The caller's classification. `None` means the caller did not classify.
    pub classification: Option<FieldClassification>,
}

/// What the request acts on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestTarget {
    None,
    Window {
        identity: WindowIdentity,
        field: Option<TextField>,
    },
    File {
        path: PathBuf,
    },
}

/// Input to [`crate::EnforcementGate::enforce`].
#[derive(Clone, Debug)]
pub struct GateRequest {
    pub session: SessionId,
    pub capability: Capability,
    pub scope: Scope,
    pub grant: GrantId,
    pub target: RequestTarget,
    /// A consent receipt was redeemed for this request.
    pub consent_satisfied: bool,
}

/// What a gate verified. Handed to the effect actuator with the effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateClearance {
    pub gate: String,
    pub capability: Capability,
    pub session: SessionId,
    pub window: Option<WindowIdentity>,
    pub file: Option<FileIdentity>,
    pub classification: Option<FieldClassification>,
}

impl GateClearance {
    pub fn new(gate: &str, request: &GateRequest) -> Self {
        Self {
            gate: gate.to_string(),
            capability: request.capability,
            session: request.session.clone(),
            window: None,
            file: None,
            classification: None,
        }
    }
}
