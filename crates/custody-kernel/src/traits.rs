use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ActuatorError;
use crate::types::{AuthorizedEffect, CapabilityRequest, EffectOutcome, ProposedAction};

/// A policy rule the proposed action breaks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub policy: String,
    pub message: String,
}

impl PolicyViolation {
    pub fn new(policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            message: message.into(),
        }
    }
}

/// Host policy consulted by the execution guard. No violations means proceed.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, request: &CapabilityRequest, action: &ProposedAction) -> Vec<PolicyViolation>;
}

/// Performs an authorized effect on the target application.
#[async_trait]
pub trait EffectActuator: Send + Sync {
    async fn actuate(&self, effect: AuthorizedEffect) -> Result<EffectOutcome, ActuatorError>;
}
