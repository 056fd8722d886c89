use std::sync::Arc;

use custody_session::{EndReason, RevocationListener};
use custody_types::{
    AuthorityError, Capability, CapabilityFamily, DenyReason, FieldClassification, HardStopReason,
    Scope, SessionId, WindowIdentity,
};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::base::GateBase;
use crate::request::{GateClearance, GateRequest, RequestTarget, TextField};
use crate::traits::{EnforcementGate, FieldClassifier, WindowProbe};

/// Gate for UI navigation, text input and parameter adjustment.
///
/// The first request in a session binds the target window. Every later request
/// must present the same identity, and the live window must still match it.
pub struct UiGate {
    base: GateBase,
    windows: Arc<dyn WindowProbe>,
    classifier: Option<Arc<dyn FieldClassifier>>,
    binding: Mutex<Option<(SessionId, WindowIdentity)>>,
}

impl UiGate {
    pub fn new(base: GateBase, windows: Arc<dyn WindowProbe>) -> Self {
        Self {
            base,
            windows,
            classifier: None,
            binding: Mutex::new(None),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FieldClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// The window bound for the current session, if any.
    pub fn bound_window(&self) -> Option<WindowIdentity> {
        self.binding.lock().as_ref().map(|(_, w)| w.clone())
    }

    pub fn clear_binding(&self) {
        *self.binding.lock() = None;
    }

    fn check_window(
        &self,
        request: &GateRequest,
        claimed: &WindowIdentity,
    ) -> Result<WindowIdentity, AuthorityError> {
        if let Scope::Window { owner } = &request.scope {
            if owner != &claimed.owner_path {
                return Err(AuthorityError::CapabilityDenied(
                    DenyReason::WindowOutOfScope(claimed.owner_path.clone()),
                ));
            }
        }

        let bound = {
            let mut binding = self.binding.lock();
            match binding.as_ref() {
                Some((session, window)) if session == &request.session => window.clone(),
                _ => {
                    info!(
                        session = %request.session,
                        pid = claimed.pid,
                        window = claimed.window_number,
                        "Binding target window"
                    );
                    *binding = Some((request.session.clone(), claimed.clone()));
                    claimed.clone()
                }
            }
        };

        if &bound != claimed {
            error!(session = %request.session, "Claimed window differs from bound window");
            return Err(AuthorityError::HardStop(
                HardStopReason::WindowIdentityChanged,
            ));
        }

        match self.windows.live_identity(bound.window_number) {
            None => Err(AuthorityError::HardStop(HardStopReason::WindowGone)),
            Some(live) if live != bound => {
                error!(
                    session = %request.session,
                    window = bound.window_number,
                    "Live window identity changed"
                );
                Err(AuthorityError::HardStop(
                    HardStopReason::WindowIdentityChanged,
                ))
            }
            Some(_) => Ok(bound),
        }
    }

    /// Resolve the effective classification: the stricter of caller and
    /// classifier. Neither opinion means no classification.
    fn classify(
        &self,
        window: &WindowIdentity,
        field: &TextField,
    ) -> Option<FieldClassification> {
        let second = self
            .classifier
            .as_ref()
            .map(|c| c.classify(window, &field.field_id));
        match (field.classification, second) {
            (Some(a), Some(b)) => Some(a.stricter(b)),
            (a, b) => a.or(b),
        }
    }

    fn check_text_input(
        &self,
        request: &GateRequest,
        window: &WindowIdentity,
        field: Option<&TextField>,
    ) -> Result<FieldClassification, AuthorityError> {
        let field = field.ok_or_else(|| {
            AuthorityError::CapabilityDenied(DenyReason::TargetMissing("text field".into()))
        })?;
        match self.classify(window, field) {
            None => Err(AuthorityError::CapabilityDenied(
                DenyReason::ClassificationMissing,
            )),
            Some(FieldClassification::Sensitive) => {
                error!(session = %request.session, field = %field.field_id, "Sensitive field targeted");
                Err(AuthorityError::HardStop(HardStopReason::SensitiveField))
            }
            Some(FieldClassification::Unknown) if !request.consent_satisfied => {
                Err(AuthorityError::ConsentRequired {
                    capability: request.capability,
                    token: None,
                })
            }
            Some(classification) => Ok(classification),
        }
    }
}

impl EnforcementGate for UiGate {
    fn name(&self) -> &str {
        "ui"
    }

    fn handles(&self, capability: Capability) -> bool {
        capability.family() == CapabilityFamily::Ui
    }

    fn enforce(&self, request: &GateRequest) -> Result<GateClearance, AuthorityError> {
        self.base.guarded(self.name(), request, || {
            let (claimed, field) = match &request.target {
                RequestTarget::Window { identity, field } => (identity, field.as_ref()),
                _ => {
                    return Err(AuthorityError::CapabilityDenied(
                        DenyReason::TargetMissing("window".into()),
                    ))
                }
            };
            let window = self.check_window(request, claimed)?;

            let mut clearance = GateClearance::new(self.name(), request);
            if request.capability == Capability::TextInput {
                clearance.classification =
                    Some(self.check_text_input(request, &window, field)?);
            }
            clearance.window = Some(window);
            Ok(clearance)
        })
    }
}

impl RevocationListener for UiGate {
    fn listener_name(&self) -> &str {
        "ui-gate"
    }

    fn on_session_end(&self, session: &SessionId, _reason: &EndReason) {
        let mut binding = self.binding.lock();
        if binding.as_ref().is_some_and(|(s, _)| s == session) {
            debug!(session = %session, "Window binding cleared");
            *binding = None;
        }
    }
}
