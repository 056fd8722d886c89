use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use custody_audit::{AuditEventType, AuditLog};
use custody_session::{EndReason, RevocationListener, SessionContext};
use custody_types::{
    AuthorityError, Capability, CapabilityGrant, Clock, DenyReason, GrantId, Scope, SessionId,
};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};

use crate::receipt::{ConsentReceipt, ReceiptBook};

/// Outcome of a capability check.
#[derive(Clone, Debug)]
pub enum Decision {
    /// Proceed. `consented` is true when a consent receipt was redeemed by this check.
    Allow {
        grant: CapabilityGrant,
        consented: bool,
    },
    /// The grant requires a consent checkpoint before use.
    NeedsConsent(CapabilityGrant),
    /// Final for this request.
    Deny(AuthorityError),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Collapse into a result; `NeedsConsent` becomes `ConsentRequired`.
    pub fn into_result(self) -> Result<(CapabilityGrant, bool), AuthorityError> {
        match self {
            Decision::Allow { grant, consented } => Ok((grant, consented)),
            Decision::NeedsConsent(grant) => Err(AuthorityError::ConsentRequired {
                capability: grant.capability,
                token: None,
            }),
            Decision::Deny(err) => Err(err),
        }
    }
}

/// Session-scoped store of capability grants.
pub struct CapabilityAuthority {
    session: Arc<SessionContext>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    receipts: Arc<ReceiptBook>,
    grants: RwLock<HashMap<GrantId, CapabilityGrant>>,
}

impl CapabilityAuthority {
    pub fn new(
        session: Arc<SessionContext>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        receipts: Arc<ReceiptBook>,
    ) -> Self {
        Self {
            session,
            audit,
            clock,
            receipts,
            grants: RwLock::new(HashMap::new()),
        }
    }

    /// Grant `capability` over `scope` to `session` for `ttl`.
    ///
    /// Consent is required if the caller asks for it or the capability's
    /// definition demands it.
    pub fn grant(
        &self,
        session: &SessionId,
        capability: Capability,
        scope: Scope,
        ttl: Duration,
        requires_consent: bool,
    ) -> Result<CapabilityGrant, AuthorityError> {
        self.session.assert_session(session)?;
        scope.validate_for(capability)?;

        let now = self.clock.now();
        let grant = CapabilityGrant {
            id: GrantId::new(),
            capability,
            scope,
            session: session.clone(),
            requires_consent: requires_consent || capability.definition().requires_consent,
            issued_at: now,
            expires_at: now + ttl,
            granted_at: Utc::now(),
        };

        self.grants.write().insert(grant.id, grant.clone());
        // A session end between the assert and the insert has already swept
        // the store, so the new grant must not survive it.
        if let Err(err) = self.session.assert_session(session) {
            self.grants.write().remove(&grant.id);
            warn!(session = %session, grant = %grant.id, "Session ended while granting");
            return Err(err);
        }
        self.audit.append(
            AuditEventType::CapabilityGranted,
            json!({
                "grant": grant.id.to_string(),
                "session": session.as_str(),
                "capability": capability,
                "scope": grant.scope,
                "ttl_ms": ttl.as_millis() as u64,
                "requires_consent": grant.requires_consent,
            }),
        );
        info!(
            session = %session,
            grant = %grant.id,
            capability = %capability,
            requires_consent = grant.requires_consent,
            "Capability granted"
        );
        Ok(grant)
    }

    /// Decide whether `capability` over `scope` may proceed right now.
    pub fn check(
        &self,
        session: &SessionId,
        capability: Capability,
        scope: &Scope,
        receipt: Option<ConsentReceipt>,
    ) -> Decision {
        let decision = self.decide(session, capability, scope, receipt);
        match &decision {
            Decision::Allow { grant, consented } => {
                self.audit.append(
                    AuditEventType::CapabilityAllowed,
                    json!({
                        "grant": grant.id.to_string(),
                        "capability": capability,
                        "consented": consented,
                    }),
                );
            }
            Decision::NeedsConsent(grant) => {
                info!(grant = %grant.id, capability = %capability, "Consent checkpoint required");
            }
            Decision::Deny(err) => {
                warn!(session = %session, capability = %capability, error = %err, "Capability denied");
                self.audit.append(
                    AuditEventType::CapabilityDenied,
                    json!({
                        "session": session.as_str(),
                        "capability": capability,
                        "scope": scope,
                        "category": err.category(),
                        "detail": err.to_string(),
                    }),
                );
            }
        }
        decision
    }

    fn decide(
        &self,
        session: &SessionId,
        capability: Capability,
        scope: &Scope,
        receipt: Option<ConsentReceipt>,
    ) -> Decision {
        if let Err(err) = self.session.assert_session(session) {
            return Decision::Deny(err);
        }

        let now = self.clock.now();
        let (grant, any_expired) = {
            let grants = self.grants.read();
            let matching = grants
                .values()
                .filter(|g| &g.session == session && g.covers(capability, scope));
            let mut live: Option<CapabilityGrant> = None;
            let mut expired = false;
            for g in matching {
                if g.is_expired(now) {
                    expired = true;
                } else if live
                    .as_ref()
                    .map(|l| g.issued_at > l.issued_at)
                    .unwrap_or(true)
                {
                    live = Some(g.clone());
                }
            }
            (live, expired)
        };

        let grant = match grant {
            Some(g) => g,
            None if any_expired => {
                return Decision::Deny(AuthorityError::CapabilityDenied(DenyReason::Expired))
            }
            None => {
                return Decision::Deny(AuthorityError::CapabilityDenied(DenyReason::NoGrant(
                    capability,
                )))
            }
        };

        let consented = match receipt {
            Some(receipt) => {
                if let Err(failure) = self.receipts.redeem(receipt, session, capability, grant.id)
                {
                    return Decision::Deny(AuthorityError::ConsentInvalid(failure));
                }
                true
            }
            None => false,
        };

        if grant.requires_consent && !consented {
            return Decision::NeedsConsent(grant);
        }
        Decision::Allow { grant, consented }
    }

    /// Validate a specific grant id for `session`.
    pub fn check_grant(
        &self,
        session: &SessionId,
        grant_id: GrantId,
    ) -> Result<CapabilityGrant, AuthorityError> {
        self.session.assert_session(session)?;
        let grant = self
            .grants
            .read()
            .get(&grant_id)
            .cloned()
            .ok_or(AuthorityError::CapabilityDenied(DenyReason::Revoked))?;

        if &grant.session != session {
            return Err(AuthorityError::SessionMismatch(format!(
                "grant {} belongs to {}",
                grant_id, grant.session
            )));
        }
        if grant.is_expired(self.clock.now()) {
            return Err(AuthorityError::CapabilityDenied(DenyReason::Expired));
        }
        Ok(grant)
    }

    /// The newest live grant covering `capability` over `scope`. Redeems
    /// nothing and records no decision.
    pub fn matching_grant(
        &self,
        session: &SessionId,
        capability: Capability,
        scope: &Scope,
    ) -> Option<CapabilityGrant> {
        let now = self.clock.now();
        self.grants
            .read()
            .values()
            .filter(|g| &g.session == session && g.covers(capability, scope) && !g.is_expired(now))
            .max_by_key(|g| g.issued_at)
            .cloned()
    }

    /// Redeem a receipt against a grant outside of a full check.
    pub fn redeem_receipt(
        &self,
        session: &SessionId,
        grant: &CapabilityGrant,
        receipt: ConsentReceipt,
    ) -> Result<(), AuthorityError> {
        self.receipts
            .redeem(receipt, session, grant.capability, grant.id)
            .map_err(AuthorityError::ConsentInvalid)
    }

    pub fn revoke(&self, grant_id: GrantId) -> bool {
        let removed = self.grants.write().remove(&grant_id);
        if let Some(grant) = &removed {
            self.audit.append(
                AuditEventType::CapabilityRevoked,
                json!({ "grant": grant_id.to_string(), "capability": grant.capability }),
            );
            info!(grant = %grant_id, "Capability revoked");
        }
        removed.is_some()
    }

    /// Revoke every grant and every outstanding receipt.
    pub fn revoke_all(&self, reason: &str) -> usize {
        let drained: Vec<CapabilityGrant> = self.grants.write().drain().map(|(_, g)| g).collect();
        let sessions: HashSet<SessionId> = drained.iter().map(|g| g.session.clone()).collect();
        for session in &sessions {
            self.receipts.clear_session(session);
        }

        self.audit.append(
            AuditEventType::CapabilityRevoked,
            json!({
                "all": true,
                "count": drained.len(),
                "grants": drained.iter().map(|g| g.id.to_string()).collect::<Vec<_>>(),
                "reason": reason,
            }),
        );
        info!(count = drained.len(), reason, "All capabilities revoked");
        drained.len()
    }

    pub fn active_grants(&self) -> Vec<CapabilityGrant> {
        let now = self.clock.now();
        self.grants
            .read()
            .values()
            .filter(|g| !g.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn receipts(&self) -> &Arc<ReceiptBook> {
        &self.receipts
    }
}

impl RevocationListener for CapabilityAuthority {
    fn listener_name(&self) -> &str {
        "capability-authority"
    }

    fn on_session_end(&self, session: &SessionId, reason: &EndReason) {
        self.revoke_all(&reason.to_string());
        self.receipts.clear_session(session);
    }
}
