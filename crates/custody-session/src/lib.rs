//! Session authority for the Custody kernel.
//!
//! [`SessionContext`] is the single synchronized global: exactly one session
//! may be bound, binding a different one is an error, and ending a session
//! revokes every derived authority (grants, consent tokens, bookmarks, window
//! bindings, export jobs) through registered [`RevocationListener`]s before
//! `end` returns.
//!
//! [`PhaseMachine`] tracks the session through its explicit phases, and
//! [`SilenceTracker`] / [`SessionTtl`] supply the time-based guard inputs.

pub mod context;
pub mod lifecycle;
pub mod phase;
pub mod timers;

pub use context::{BoundSession, RevocationListener, SessionContext};
pub use lifecycle::{EndReason, LifecycleEvent};
pub use phase::{PhaseMachine, SessionPhase};
pub use timers::{SessionTtl, SilenceTracker};
