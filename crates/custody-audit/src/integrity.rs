//! Integrity verification for audit chains

use serde::{Deserialize, Serialize};

use crate::event::{AuditEvent, GENESIS_HASH};

/// Result of verifying a chain of audit events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total: usize,
    /// Number of leading events that verified.
    pub verified: usize,
    /// Sequence number of the first event that failed.
    pub first_invalid: Option<u64>,
    pub reason: Option<String>,
}

/// Recompute every hash from entry 0 and check sequence and linkage.
pub(crate) fn verify(events: &[AuditEvent]) -> ChainVerification {
    let mut result = ChainVerification {
        valid: true,
        total: events.len(),
        verified: 0,
        first_invalid: None,
        reason: None,
    };

    let mut expected_prev = GENESIS_HASH;
    for (i, event) in events.iter().enumerate() {
        let failure = if event.sequence != i as u64 {
            Some(format!(
                "sequence gap: expected {}, found {}",
                i, event.sequence
            ))
        } else if event.prev_hash != expected_prev {
            Some(format!(
                "broken link at {}: expected prev {}, got {}",
                event.sequence, expected_prev, event.prev_hash
            ))
        } else if event.recompute_hash() != event.hash {
            Some(format!("event {} has invalid hash", event.sequence))
        } else {
            None
        };

        if let Some(reason) = failure {
            result.valid = false;
            result.first_invalid = Some(i as u64);
            result.reason = Some(reason);
            return result;
        }

        expected_prev = event.hash.as_str();
        result.verified = i + 1;
    }

    result
}
