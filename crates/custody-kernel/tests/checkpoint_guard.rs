mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{editor_window, executing, executing_with, Harness};
use custody_kernel::{
    AuditEventType, AuthorityError, Capability, CapabilityRequest, ChallengeKind,
    ConsentFailure, ConsentTokenId, ContextBoundary, HardStopReason, KernelConfig, LifecycleEvent,
    MockPlatform, ProposedAction, RequestTarget, Scope, SessionPhase, TokenState,
};
use serde_json::json;

fn gain() -> Scope {
    Scope::Parameter {
        name: "gain".into(),
    }
}

fn gain_request(h: &Harness) -> CapabilityRequest {
    CapabilityRequest::new(h.id.clone(), Capability::ParameterAdjustment, gain()).with_target(
        RequestTarget::Window {
            identity: editor_window(),
            field: None,
        },
    )
}

fn set_gain() -> ProposedAction {
    ProposedAction::new("set_gain", json!({ "db": -3 }))
}

fn with_gain_grant() -> Harness {
    let h = executing();
    h.mocks.windows.set(editor_window());
    h.adapter
        .grant(&h.id, Capability::ParameterAdjustment, gain(), None, false)
        .unwrap();
    h
}

/// Let the silence timer lapse and trip the checkpoint.
async fn go_silent(h: &Harness) -> ConsentTokenId {
    h.mocks.clock.advance(Duration::from_secs(301));
    let err = h
        .adapter
        .execute(gain_request(h), set_gain(), None)
        .await
        .unwrap_err();
    match err {
        AuthorityError::ConsentRequired {
            capability: Capability::ParameterAdjustment,
            token: Some(token),
        } => token,
        other => panic!("expected a checkpoint, got {other:?}"),
    }
}

#[tokio::test]
async fn silence_forces_a_checkpoint() {
    let h = with_gain_grant();
    let token = go_silent(&h).await;

    assert_eq!(h.adapter.phase(), SessionPhase::Checkpoint);
    let pending = h.adapter.checkpoint().unwrap();
    assert_eq!(pending.challenge.token, token);
    assert!(!pending.spent);
    assert_eq!(h.mocks.actuator.count(), 0);

    h.adapter
        .resume_after_checkpoint(&h.id, token, &pending.challenge.display)
        .unwrap();
    assert_eq!(h.adapter.phase(), SessionPhase::Executing);
    assert!(h.adapter.checkpoint().is_none());

    h.adapter
        .execute(gain_request(&h), set_gain(), None)
        .await
        .unwrap();
    assert_eq!(h.mocks.actuator.count(), 1);
}

#[tokio::test]
async fn user_activity_keeps_the_checkpoint_away() {
    let h = with_gain_grant();
    h.mocks.clock.advance(Duration::from_secs(200));
    h.adapter.record_user_action();
    h.mocks.clock.advance(Duration::from_secs(200));
    h.adapter
        .execute(gain_request(&h), set_gain(), None)
        .await
        .unwrap();
    assert_eq!(h.adapter.phase(), SessionPhase::Executing);
}

#[tokio::test]
async fn dismissal_pauses_until_reopened() {
    let h = with_gain_grant();
    let token = go_silent(&h).await;

    h.adapter.dismiss_checkpoint(token).unwrap();
    assert_eq!(h.adapter.phase(), SessionPhase::Paused);
    assert_eq!(h.adapter.consent().state(token), Some(TokenState::Dismissed));

    let err = h
        .adapter
        .execute(gain_request(&h), set_gain(), None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "GUARD_VIOLATION");
    assert_eq!(h.mocks.actuator.count(), 0);

    // The dismissed token can never resume execution.
    let err = h
        .adapter
        .resume_after_checkpoint(&h.id, token, "anything")
        .unwrap_err();
    assert_eq!(err.category(), "CONSENT_INVALID");
    assert_eq!(h.adapter.phase(), SessionPhase::Paused);

    let fresh = h
        .adapter
        .reopen_checkpoint(&h.id, Some(ChallengeKind::DeliberateGesture))
        .unwrap();
    assert_ne!(fresh.token, token);
    assert_eq!(h.adapter.phase(), SessionPhase::Checkpoint);

    h.adapter
        .resume_after_checkpoint(&h.id, fresh.token, &fresh.display)
        .unwrap();
    assert_eq!(h.adapter.phase(), SessionPhase::Executing);
}

#[tokio::test]
async fn wrong_response_pauses() {
    let h = with_gain_grant();
    let token = go_silent(&h).await;

    let err = h
        .adapter
        .resume_after_checkpoint(&h.id, token, "definitely wrong")
        .unwrap_err();
    assert_eq!(err, AuthorityError::ConsentInvalid(ConsentFailure::Mismatch));
    assert_eq!(h.adapter.phase(), SessionPhase::Paused);
    assert!(h.adapter.checkpoint().unwrap().spent);
}

#[test]
fn consent_token_is_single_use() {
    let h = executing();
    let scope = Scope::File {
        path: PathBuf::from("/out.wav"),
    };
    h.adapter
        .grant(&h.id, Capability::FileWrite, scope.clone(), None, false)
        .unwrap();

    let challenge = h
        .adapter
        .issue_consent(&h.id, Capability::FileWrite, &scope, "write mixdown", None)
        .unwrap();
    assert_eq!(challenge.kind, ChallengeKind::TypeCode);

    h.adapter
        .validate_consent(&h.id, Capability::FileWrite, challenge.token, &challenge.display)
        .unwrap();
    let err = h
        .adapter
        .validate_consent(&h.id, Capability::FileWrite, challenge.token, &challenge.display)
        .unwrap_err();
    assert_eq!(err.category(), "CONSENT_INVALID");
    assert_eq!(err, AuthorityError::ConsentInvalid(ConsentFailure::Reused));
}

#[test]
fn consent_needs_a_live_grant() {
    let h = executing();
    let err = h
        .adapter
        .issue_consent(
            &h.id,
            Capability::FileWrite,
            &Scope::File {
                path: PathBuf::from("/out.wav"),
            },
            "write mixdown",
            None,
        )
        .unwrap_err();
    assert_eq!(err.category(), "CAPABILITY_DENIED");
    assert_eq!(h.adapter.audit().count_of(AuditEventType::ConsentIssued), 0);
}

#[tokio::test]
async fn session_lifetime_expiry_halts_everything() {
    let mut config = KernelConfig::default();
    config.session.ttl_secs = 600;
    config.session.silence_timeout_secs = 600;
    let h = executing_with(config, MockPlatform::new());
    h.mocks.windows.set(editor_window());
    h.adapter
        .grant(
            &h.id,
            Capability::ParameterAdjustment,
            gain(),
            Some(Duration::from_secs(3600)),
            false,
        )
        .unwrap();

    h.mocks.clock.advance(Duration::from_secs(601));
    let err = h
        .adapter
        .execute(gain_request(&h), set_gain(), None)
        .await
        .unwrap_err();
    assert_eq!(err, AuthorityError::HardStop(HardStopReason::SessionExpired));
    assert!(h.adapter.session().current().is_none());
    assert_eq!(h.adapter.phase(), SessionPhase::Inactive);
    assert!(h.adapter.authority().active_grants().is_empty());

    let ended = h.adapter.audit().events_by_type(AuditEventType::SessionEnded);
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].payload["reason"], "session lifetime exceeded");
    assert_eq!(h.mocks.actuator.count(), 0);
}

#[tokio::test]
async fn leaving_the_session_context_halts_execution() {
    let h = with_gain_grant();
    h.adapter
        .bind_boundary(&h.id, ContextBoundary::new().file("/proj/song.als").modality("ui"))
        .unwrap();

    h.adapter
        .execute(
            gain_request(&h).with_context(ContextBoundary::new().file("/proj/song.als")),
            set_gain(),
            None,
        )
        .await
        .unwrap();

    let err = h
        .adapter
        .execute(
            gain_request(&h).with_context(ContextBoundary::new().file("/proj/other.als")),
            set_gain(),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthorityError::GuardViolation {
            failed: vec!["boundary_not_crossed".to_string()]
        }
    );
    assert_eq!(h.mocks.actuator.count(), 1);

    h.adapter.handle_lifecycle(&LifecycleEvent::ExplicitEnd);
    assert!(h.adapter.boundary().is_none());
}

#[tokio::test]
async fn low_confidence_halts_execution() {
    let h = with_gain_grant();
    let err = h
        .adapter
        .execute(gain_request(&h).with_confidence(0.3), set_gain(), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthorityError::GuardViolation {
            failed: vec!["confidence_not_degraded".to_string()]
        }
    );
    assert_eq!(h.mocks.actuator.count(), 0);
    assert_eq!(h.adapter.phase(), SessionPhase::Executing);

    h.adapter
        .execute(gain_request(&h).with_confidence(0.9), set_gain(), None)
        .await
        .unwrap();
    assert_eq!(h.mocks.actuator.count(), 1);
}
