//! Core type definitions for the Custody authority kernel.
//!
//! This crate provides the shared vocabulary. No enforcement logic, just types.
//! Every Custody crate depends on this crate.
//!
//! ## Kernel Invariants
//!
//! - At most one session is bound at a time.
//! - A capability grant never outlives the session that created it.
//! - Every capability defaults to deny; there is no implicit allow path.
//! - Window and file identities are compared by value, never by handle or path alone.

pub mod capability;
pub mod clock;
pub mod error;
pub mod identity;
pub mod ids;

// Re-export primary types at crate root for ergonomic use.
pub use capability::{
    Capability, CapabilityDefinition, CapabilityFamily, CapabilityGrant, DefaultPosture, Scope,
    ScopeKind,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthorityError, ConsentFailure, DenyReason, HardStopReason};
pub use identity::{FieldClassification, FileIdentity, WindowIdentity};
pub use ids::{BookmarkId, ConsentTokenId, GrantId, JobId, SessionId};
