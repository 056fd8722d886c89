//! Mock collaborators for tests and demos.

use std::sync::Arc;

use async_trait::async_trait;
use custody_gates::{MockDialogProbe, MockFieldClassifier, MockJobBehavior, MockJobLauncher, MockWindowProbe};
use custody_types::{Clock, ManualClock};
use parking_lot::Mutex;

use crate::adapter::Platform;
use crate::error::ActuatorError;
use crate::traits::{EffectActuator, PolicyEvaluator, PolicyViolation};
use crate::types::{AuthorizedEffect, CapabilityRequest, EffectOutcome, ProposedAction};

/// Actuator that records every effect it receives.
#[derive(Default)]
pub struct RecordingActuator {
    effects: Mutex<Vec<AuthorizedEffect>>,
    fail_with: Mutex<Option<ActuatorError>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail with `err`.
    pub fn fail_with(&self, err: ActuatorError) {
        *self.fail_with.lock() = Some(err);
    }

    pub fn effects(&self) -> Vec<AuthorizedEffect> {
        self.effects.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.effects.lock().len()
    }
}

#[async_trait]
impl EffectActuator for RecordingActuator {
    async fn actuate(&self, effect: AuthorizedEffect) -> Result<EffectOutcome, ActuatorError> {
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        let summary = format!("{} via {}", effect.action.action_type, effect.capability);
        self.effects.lock().push(effect);
        Ok(EffectOutcome {
            summary,
            detail: serde_json::Value::Null,
        })
    }
}

/// Policy that flags any action whose type is on a deny list.
#[derive(Default)]
pub struct MockPolicy {
    denied_actions: Mutex<Vec<String>>,
}

impl MockPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_action(&self, action_type: &str) {
        self.denied_actions.lock().push(action_type.to_string());
    }
}

impl PolicyEvaluator for MockPolicy {
    fn evaluate(&self, _request: &CapabilityRequest, action: &ProposedAction) -> Vec<PolicyViolation> {
        self.denied_actions
            .lock()
            .iter()
            .filter(|denied| **denied == action.action_type)
            .map(|denied| {
                PolicyViolation::new(format!("deny-{}", denied), "action type is denied")
            })
            .collect()
    }
}

/// A full set of mock collaborators plus handles to drive them.
pub struct MockPlatform {
    pub clock: Arc<ManualClock>,
    pub dialogs: Arc<MockDialogProbe>,
    pub windows: Arc<MockWindowProbe>,
    pub classifier: Option<Arc<MockFieldClassifier>>,
    pub launcher: Arc<MockJobLauncher>,
    pub policy: Arc<MockPolicy>,
    pub actuator: Arc<RecordingActuator>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::with_job_behavior(MockJobBehavior::Cooperative)
    }

    pub fn with_job_behavior(behavior: MockJobBehavior) -> Self {
        Self {
            clock: Arc::new(ManualClock::new()),
            dialogs: Arc::new(MockDialogProbe::new()),
            windows: Arc::new(MockWindowProbe::new()),
            classifier: None,
            launcher: Arc::new(MockJobLauncher::new(behavior)),
            policy: Arc::new(MockPolicy::new()),
            actuator: Arc::new(RecordingActuator::new()),
        }
    }

    /// Collaborators driven by the manual clock.
    pub fn platform(&self) -> Platform {
        self.platform_with_clock(self.clock.clone())
    }

    /// Collaborators driven by `clock`, for tests that need real time.
    pub fn platform_with_clock(&self, clock: Arc<dyn Clock>) -> Platform {
        Platform {
            clock,
            dialogs: self.dialogs.clone(),
            windows: self.windows.clone(),
            classifier: self
                .classifier
                .clone()
                .map(|c| c as Arc<dyn custody_gates::FieldClassifier>),
            launcher: self.launcher.clone(),
            policy: Some(self.policy.clone()),
            actuator: self.actuator.clone(),
        }
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}
