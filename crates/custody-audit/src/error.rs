use thiserror::Error;

/// Errors from exporting or importing an audit trail.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed audit line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
