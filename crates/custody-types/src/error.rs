use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::Capability;
use crate::ids::{ConsentTokenId, JobId};

/// Why an action was hard-stopped. A hard stop ends the session.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardStopReason {
    #[error("system dialog visible: {0}")]
    DialogVisible(String),

    #[error("window identity changed")]
    WindowIdentityChanged,

    #[error("window no longer exists")]
    WindowGone,

    #[error("file identity changed: {0}")]
    IdentityChanged(PathBuf),

    #[error("bookmarked file missing: {0}")]
    FileMissing(PathBuf),

    #[error("sensitive field targeted")]
    SensitiveField,

    #[error("export job {0} did not stop")]
    JobDidNotStop(JobId),

    #[error("session lifetime exceeded")]
    SessionExpired,
}

/// Why a capability check denied.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    #[error("no grant for {0}")]
    NoGrant(Capability),

    #[error("grant expired")]
    Expired,

    #[error("grant revoked")]
    Revoked,

    #[error("no bookmark for {0}")]
    NoBookmark(PathBuf),

    #[error("bookmark does not cover {0}")]
    OutsideBookmark(PathBuf),

    #[error("window owned by {0} is outside the granted scope")]
    WindowOutOfScope(PathBuf),

    #[error("request target missing: {0}")]
    TargetMissing(String),

    #[error("execution ticket missing or invalid: {0}")]
    Ticket(String),

    #[error("field classification required")]
    ClassificationMissing,

    #[error("session phase {0} does not permit execution")]
    Phase(String),
}

/// Why a consent token failed validation. Every failure is permanent.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentFailure {
    #[error("unknown consent token {0}")]
    Unknown(ConsentTokenId),

    #[error("consent token already used")]
    Reused,

    #[error("consent token expired")]
    Expired,

    #[error("response does not match challenge")]
    Mismatch,

    #[error("token issued for {expected}, presented for {presented}")]
    WrongCapability {
        expected: Capability,
        presented: Capability,
    },

    #[error("token belongs to another session")]
    WrongSession,

    #[error("checkpoint dismissed")]
    Dismissed,

    #[error("token revoked")]
    Revoked,

    #[error("consent receipt invalid")]
    BadReceipt,
}

/// The error taxonomy every authority decision reports in.
///
/// Every variant is terminal for the request that produced it: no retry, no
/// escalation, no downgrade.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("session mismatch: {0}")]
    SessionMismatch(String),

    #[error("hard stop: {0}")]
    HardStop(HardStopReason),

    #[error("capability denied: {0}")]
    CapabilityDenied(DenyReason),

    #[error("consent required for {capability}")]
    ConsentRequired {
        capability: Capability,
        /// Checkpoint token issued for this request, if one was issued.
        token: Option<ConsentTokenId>,
    },

    #[error("consent invalid: {0}")]
    ConsentInvalid(ConsentFailure),

    #[error("guard violation: {}", failed.join(", "))]
    GuardViolation { failed: Vec<String> },

    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("invalid scope for {capability}: {reason}")]
    InvalidScope {
        capability: Capability,
        reason: String,
    },

    #[error("i/o error: {0}")]
    Io(String),
}

impl AuthorityError {
    /// User-facing category string.
    pub fn category(&self) -> &'static str {
        match self {
            AuthorityError::SessionMismatch(_) => "SESSION_MISMATCH",
            AuthorityError::HardStop(_) => "HARD_STOP",
            AuthorityError::CapabilityDenied(_) => "CAPABILITY_DENIED",
            AuthorityError::ConsentRequired { .. } => "CONSENT_REQUIRED",
            AuthorityError::ConsentInvalid(_) => "CONSENT_INVALID",
            AuthorityError::GuardViolation { .. } => "GUARD_VIOLATION",
            AuthorityError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            AuthorityError::InvalidScope { .. } => "INVALID_SCOPE",
            AuthorityError::Io(_) => "IO_ERROR",
        }
    }

    pub fn is_hard_stop(&self) -> bool {
        matches!(self, AuthorityError::HardStop(_))
    }
}

impl From<std::io::Error> for AuthorityError {
    fn from(err: std::io::Error) -> Self {
        AuthorityError::Io(err.to_string())
    }
}
