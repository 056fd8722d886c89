use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::{DateTime, Utc};
use custody_audit::{AuditEventType, AuditLog};
use custody_types::{AuthorityError, Clock, SessionId};
use parking_lot::Mutex;
use serde_json::json;

use crate::lifecycle::{EndReason, LifecycleEvent};

/// Receives session-end notifications.
///
/// Called synchronously while the session lock is held. Implementations must
/// clear their session-derived state and must not call back into the
/// [`SessionContext`].
pub trait RevocationListener: Send + Sync {
    fn listener_name(&self) -> &str;

    fn on_session_end(&self, session: &SessionId, reason: &EndReason);
}

/// The currently bound session.
#[derive(Clone, Debug)]
pub struct BoundSession {
    pub id: SessionId,
    pub bound_at: DateTime<Utc>,
    pub bound_instant: Instant,
}

/// Single source of truth for which session, if any, holds authority.
pub struct SessionContext {
    bound: Mutex<Option<BoundSession>>,
    listeners: Mutex<Vec<Weak<dyn RevocationListener>>>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl SessionContext {
    pub fn new(audit: Arc<AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bound: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            audit,
            clock,
        }
    }

    /// Bind `id` as the active session.
    ///
    /// Rebinding the already-bound id is a no-op. Binding a different id while
    /// one is bound fails and leaves the existing binding untouched.
    pub fn bind(&self, id: SessionId) -> Result<(), AuthorityError> {
        let mut bound = self.bound.lock();
        match bound.as_ref() {
            Some(existing) if existing.id == id => Ok(()),
            Some(existing) => {
                tracing::warn!(
                    bound = %existing.id,
                    requested = %id,
                    "Refusing to bind second session"
                );
                Err(AuthorityError::SessionMismatch(format!(
                    "{} is already bound; refusing {}",
                    existing.id, id
                )))
            }
            None => {
                let session = BoundSession {
                    id: id.clone(),
                    bound_at: Utc::now(),
                    bound_instant: self.clock.now(),
                };
                self.audit.append(
                    AuditEventType::SessionBound,
                    json!({ "session": id.as_str(), "bound_at": session.bound_at }),
                );
                tracing::info!(session = %id, "Session bound");
                *bound = Some(session);
                Ok(())
            }
        }
    }

    /// Fail unless `id` is the bound session.
    pub fn assert_session(&self, id: &SessionId) -> Result<(), AuthorityError> {
        match self.bound.lock().as_ref() {
            Some(existing) if &existing.id == id => Ok(()),
            Some(existing) => Err(AuthorityError::SessionMismatch(format!(
                "presented {}, bound {}",
                id, existing.id
            ))),
            None => Err(AuthorityError::SessionMismatch(format!(
                "presented {}, no session bound",
                id
            ))),
        }
    }

    pub fn current(&self) -> Option<SessionId> {
        self.bound.lock().as_ref().map(|s| s.id.clone())
    }

    pub fn bound(&self) -> Option<BoundSession> {
        self.bound.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.bound.lock().is_some()
    }

    /// Clear the binding without notifying listeners.
    pub fn revoke(&self) -> Option<SessionId> {
        let previous = self.bound.lock().take();
        if let Some(session) = &previous {
            tracing::info!(session = %session.id, "Session binding revoked");
        }
        previous.map(|s| s.id)
    }

    /// End the bound session and revoke everything derived from it.
    ///
    /// Listeners run while the session lock is held, so no caller can observe a
    /// state where the session is gone but its grants are still live. Returns
    /// the ended session, or `None` if nothing was bound.
    pub fn end(&self, reason: EndReason) -> Option<SessionId> {
        let mut bound = self.bound.lock();
        let session = bound.take()?;

        let listeners: Vec<Arc<dyn RevocationListener>> = {
            let mut registered = self.listeners.lock();
            registered.retain(|l| l.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in &listeners {
            tracing::debug!(listener = listener.listener_name(), session = %session.id, "Revoking");
            listener.on_session_end(&session.id, &reason);
        }

        self.audit.append(
            AuditEventType::SessionEnded,
            json!({
                "session": session.id.as_str(),
                "reason": reason.to_string(),
                "listeners": listeners.iter().map(|l| l.listener_name().to_string()).collect::<Vec<_>>(),
            }),
        );

        if reason.is_hard_stop() {
            tracing::error!(session = %session.id, reason = %reason, "Session hard-stopped");
        } else {
            tracing::info!(session = %session.id, reason = %reason, "Session ended");
        }

        drop(bound);
        Some(session.id)
    }

    /// Apply a host lifecycle event. Returns the ended session, if any.
    pub fn handle_lifecycle(&self, event: &LifecycleEvent) -> Option<SessionId> {
        match event.end_reason() {
            Some(reason) => self.end(reason),
            None => {
                tracing::debug!(?event, "Lifecycle event does not rebind a session");
                None
            }
        }
    }

    /// Register a listener. Held weakly; dropped listeners are pruned.
    pub fn register_listener(&self, listener: Weak<dyn RevocationListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("bound", &self.current())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::{HardStopReason, ManualClock};

    struct Recorder {
        ended: Mutex<Vec<(SessionId, EndReason)>>,
    }

    impl RevocationListener for Recorder {
        fn listener_name(&self) -> &str {
            "recorder"
        }

        fn on_session_end(&self, session: &SessionId, reason: &EndReason) {
            self.ended.lock().push((session.clone(), reason.clone()));
        }
    }

    fn context() -> (SessionContext, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let ctx = SessionContext::new(audit.clone(), Arc::new(ManualClock::new()));
        (ctx, audit)
    }

    #[test]
    fn second_distinct_session_rejected_without_mutation() {
        let (ctx, _) = context();
        ctx.bind("a".into()).unwrap();

        let err = ctx.bind("b".into()).unwrap_err();
        assert_eq!(err.category(), "SESSION_MISMATCH");
        assert_eq!(ctx.current(), Some("a".into()));
        assert!(ctx.assert_session(&"a".into()).is_ok());
    }

    #[test]
    fn rebinding_same_session_is_noop() {
        let (ctx, audit) = context();
        ctx.bind("a".into()).unwrap();
        ctx.bind("a".into()).unwrap();
        assert_eq!(audit.count_of(AuditEventType::SessionBound), 1);
    }

    #[test]
    fn assert_fails_without_binding() {
        let (ctx, _) = context();
        assert!(ctx.assert_session(&"a".into()).is_err());
    }

    #[test]
    fn end_notifies_listeners_synchronously() {
        let (ctx, audit) = context();
        let recorder = Arc::new(Recorder {
            ended: Mutex::new(Vec::new()),
        });
        let weak: Weak<dyn RevocationListener> = Arc::downgrade(&recorder) as _;
        ctx.register_listener(weak);

        ctx.bind("a".into()).unwrap();
        let ended = ctx.end(EndReason::Explicit);

        assert_eq!(ended, Some("a".into()));
        assert!(!ctx.is_active());
        assert_eq!(recorder.ended.lock().len(), 1);
        assert_eq!(audit.count_of(AuditEventType::SessionEnded), 1);
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let (ctx, _) = context();
        {
            let recorder = Arc::new(Recorder {
                ended: Mutex::new(Vec::new()),
            });
            let weak: Weak<dyn RevocationListener> = Arc::downgrade(&recorder) as _;
            ctx.register_listener(weak);
            assert_eq!(ctx.listener_count(), 1);
        }
        assert_eq!(ctx.listener_count(), 0);
        ctx.bind("a".into()).unwrap();
        assert!(ctx.end(EndReason::Explicit).is_some());
    }

    #[test]
    fn end_without_session_is_noop() {
        let (ctx, audit) = context();
        assert!(ctx.end(EndReason::Explicit).is_none());
        assert!(audit.is_empty());
    }

    #[test]
    fn foregrounding_never_rebinds() {
        let (ctx, _) = context();
        ctx.bind("a".into()).unwrap();
        ctx.handle_lifecycle(&LifecycleEvent::Background);
        ctx.handle_lifecycle(&LifecycleEvent::Foregrounded);
        assert!(ctx.current().is_none());
    }

    #[test]
    fn hard_stop_lifecycle_ends_session() {
        let (ctx, _) = context();
        ctx.bind("a".into()).unwrap();
        let ended =
            ctx.handle_lifecycle(&LifecycleEvent::HardStop(HardStopReason::SensitiveField));
        assert_eq!(ended, Some("a".into()));
    }

    #[test]
    fn new_session_after_end() {
        let (ctx, _) = context();
        ctx.bind("a".into()).unwrap();
        ctx.end(EndReason::ScreenLocked);
        ctx.bind("b".into()).unwrap();
        assert!(ctx.assert_session(&"a".into()).is_err());
        assert!(ctx.assert_session(&"b".into()).is_ok());
    }
}
