//! Audit event record and hash computation

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// `prev_hash` of the first event in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Domain separation tag mixed into every event hash.
const DOMAIN_TAG: &[u8] = b"custody-audit-v1:";

/// Kinds of audited occurrences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    SessionBound,
    SessionEnded,
    SessionPhaseChanged,
    CapabilityGranted,
    CapabilityAllowed,
    CapabilityDenied,
    CapabilityRevoked,
    ConsentIssued,
    ConsentValidated,
    ConsentRejected,
    ConsentDismissed,
    ConsentRevoked,
    ConfirmationTransition,
    ConfirmationExecuted,
    GateCleared,
    GateDenied,
    BookmarkCreated,
    ExportStarted,
    ExportCancelled,
    EffectDispatched,
    EffectFailed,
    GuardViolation,
    HardStop,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::SessionBound => "SESSION_BOUND",
            AuditEventType::SessionEnded => "SESSION_ENDED",
            AuditEventType::SessionPhaseChanged => "SESSION_PHASE_CHANGED",
            AuditEventType::CapabilityGranted => "CAPABILITY_GRANTED",
            AuditEventType::CapabilityAllowed => "CAPABILITY_ALLOWED",
            AuditEventType::CapabilityDenied => "CAPABILITY_DENIED",
            AuditEventType::CapabilityRevoked => "CAPABILITY_REVOKED",
            AuditEventType::ConsentIssued => "CONSENT_ISSUED",
            AuditEventType::ConsentValidated => "CONSENT_VALIDATED",
            AuditEventType::ConsentRejected => "CONSENT_REJECTED",
            AuditEventType::ConsentDismissed => "CONSENT_DISMISSED",
            AuditEventType::ConsentRevoked => "CONSENT_REVOKED",
            AuditEventType::ConfirmationTransition => "CONFIRMATION_TRANSITION",
            AuditEventType::ConfirmationExecuted => "CONFIRMATION_EXECUTED",
            AuditEventType::GateCleared => "GATE_CLEARED",
            AuditEventType::GateDenied => "GATE_DENIED",
            AuditEventType::BookmarkCreated => "BOOKMARK_CREATED",
            AuditEventType::ExportStarted => "EXPORT_STARTED",
            AuditEventType::ExportCancelled => "EXPORT_CANCELLED",
            AuditEventType::EffectDispatched => "EFFECT_DISPATCHED",
            AuditEventType::EffectFailed => "EFFECT_FAILED",
            AuditEventType::GuardViolation => "GUARD_VIOLATION",
            AuditEventType::HardStop => "HARD_STOP",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the audit chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the chain, starting at 0, gapless.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    pub payload: serde_json::Value,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEvent {
    /// Build an event and seal it with its hash.
    pub(crate) fn seal(
        sequence: u64,
        timestamp: DateTime<Utc>,
        event_type: AuditEventType,
        payload: serde_json::Value,
        prev_hash: String,
    ) -> Self {
        let hash = compute_hash(sequence, &timestamp, event_type, &payload, &prev_hash);
        Self {
            sequence,
            timestamp,
            event_type,
            payload,
            prev_hash,
            hash,
        }
    }

    /// Recompute this event's hash from its contents.
    pub fn recompute_hash(&self) -> String {
        compute_hash(
            self.sequence,
            &self.timestamp,
            self.event_type,
            &self.payload,
            &self.prev_hash,
        )
    }
}

/// `BLAKE3(tag ‖ canonical(sequence, timestamp, type, payload) ‖ prev_hash)`.
///
/// Variable-length fields are length-prefixed. `serde_json::Value` objects keep
/// their keys sorted, which makes the payload encoding canonical.
fn compute_hash(
    sequence: u64,
    timestamp: &DateTime<Utc>,
    event_type: AuditEventType,
    payload: &serde_json::Value,
    prev_hash: &str,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_TAG);
    hasher.update(&sequence.to_le_bytes());

    let ts = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
    update_field(&mut hasher, ts.as_bytes());
    update_field(&mut hasher, event_type.as_str().as_bytes());

    let payload_bytes = serde_json::to_vec(payload).unwrap_or_default();
    update_field(&mut hasher, &payload_bytes);

    update_field(&mut hasher, prev_hash.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
