//! Tamper-evident audit log for the Custody kernel.
//!
//! Every authority decision, lifecycle change and hard stop is appended here as
//! an [`AuditEvent`]. Events form a BLAKE3 hash chain: each hash covers the
//! event's sequence, timestamp, type, payload and the previous hash, so editing
//! any historical entry breaks verification from that entry on.
//!
//! The log is evidence only. Nothing reads it back into an authorization decision.

pub mod error;
pub mod event;
pub mod integrity;
pub mod log;

pub use error::AuditError;
pub use event::{AuditEvent, AuditEventType, GENESIS_HASH};
pub use integrity::ChainVerification;
pub use log::AuditLog;
