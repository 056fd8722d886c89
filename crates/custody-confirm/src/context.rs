use chrono::{DateTime, Utc};
use custody_types::SessionId;
use serde::{Deserialize, Serialize};

/// Binds one proposed action to one confirmation machine.
///
/// Any difference in id, content hash, creation time or session counts as a
/// context change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationContext {
    pub context_id: String,
    /// BLAKE3 hex digest of the proposed action's canonical bytes.
    pub source_hash: String,
    pub created_at: DateTime<Utc>,
    pub session: SessionId,
}

impl ConfirmationContext {
    pub fn new(session: SessionId, source: &[u8]) -> Self {
        Self {
            context_id: uuid::Uuid::new_v4().to_string(),
            source_hash: source_hash(source),
            created_at: Utc::now(),
            session,
        }
    }

    /// Same context, different content: what a caller holds after the bound
    /// action was edited.
    pub fn with_source(&self, source: &[u8]) -> Self {
        Self {
            source_hash: source_hash(source),
            ..self.clone()
        }
    }
}

pub fn source_hash(source: &[u8]) -> String {
    hex::encode(blake3::hash(source).as_bytes())
}

/// Single-use permission to perform the confirmed action.
///
/// Produced exactly once, when a machine reaches `EXECUTED`. Not `Clone`;
/// consuming code takes it by value.
#[derive(Debug, PartialEq, Eq)]
pub struct ExecutionTicket {
    session: SessionId,
    context_id: String,
    source_hash: String,
    issued_at: DateTime<Utc>,
}

impl ExecutionTicket {
    pub(crate) fn issue(context: &ConfirmationContext) -> Self {
        Self {
            session: context.session.clone(),
            context_id: context.context_id.clone(),
            source_hash: context.source_hash.clone(),
            issued_at: Utc::now(),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// True if this ticket was issued for exactly `source`.
    pub fn covers(&self, source: &[u8]) -> bool {
        self.source_hash == source_hash(source)
    }
}
