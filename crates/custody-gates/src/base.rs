use std::sync::Arc;

use custody_audit::{AuditEventType, AuditLog};
use custody_session::SessionContext;
use custody_types::AuthorityError;
use serde_json::json;
use tracing::{debug, warn};

use crate::dialog::DialogWatcher;
use crate::request::{GateClearance, GateRequest};

/// Checks and bookkeeping shared by every gate.
#[derive(Clone)]
pub struct GateBase {
    session: Arc<SessionContext>,
    dialogs: Arc<DialogWatcher>,
    audit: Arc<AuditLog>,
}

impl GateBase {
    pub fn new(
        session: Arc<SessionContext>,
        dialogs: Arc<DialogWatcher>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            session,
            dialogs,
            audit,
        }
    }

    /// Session assert, then a fresh dialog check.
    pub fn preflight(&self, request: &GateRequest) -> Result<(), AuthorityError> {
        self.session.assert_session(&request.session)?;
        self.dialogs.check_now()
    }

    /// Run `check` after preflight and record the outcome.
    pub fn guarded<F>(
        &self,
        gate: &str,
        request: &GateRequest,
        check: F,
    ) -> Result<GateClearance, AuthorityError>
    where
        F: FnOnce() -> Result<GateClearance, AuthorityError>,
    {
        let result = self.preflight(request).and_then(|_| check());
        match &result {
            Ok(clearance) => {
                self.audit.append(
                    AuditEventType::GateCleared,
                    json!({
                        "gate": gate,
                        "capability": request.capability,
                        "grant": request.grant.to_string(),
                        "window": clearance.window,
                        "file": clearance.file,
                    }),
                );
                debug!(gate, capability = %request.capability, "Gate cleared");
            }
            Err(err) => {
                self.audit.append(
                    AuditEventType::GateDenied,
                    json!({
                        "gate": gate,
                        "capability": request.capability,
                        "grant": request.grant.to_string(),
                        "category": err.category(),
                        "detail": err.to_string(),
                    }),
                );
                warn!(gate, capability = %request.capability, error = %err, "Gate denied");
            }
        }
        result
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn dialogs(&self) -> &Arc<DialogWatcher> {
        &self.dialogs
    }
}
