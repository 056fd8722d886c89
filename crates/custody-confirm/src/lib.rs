//! Confirmation state machine ("dead-man's-switch").
//!
//! Gates the moment of execution for an irreversible action behind a
//! minimum-duration hold plus a separate, explicit confirmation gesture.
//!
//! ```text
//! GENERATED ─Show─► VISIBLE ─hold ≥ min─► ARMED ─PresentConfirm─► CONFIRM_READY ─Confirm─► EXECUTED
//!                     ▲   │ hold < min
//!                     └───┘
//! any non-terminal ─Reject─► REJECTED
//! any non-terminal ─context change / ttl─► EXPIRED
//! ```
//!
//! The machine owns all confirmation state. UI code dispatches
//! [`ConfirmationEvent`]s and reads the resulting [`ConfirmationState`].
//! Exactly one [`ExecutionTicket`] is produced per machine.

pub mod context;
pub mod error;
pub mod machine;

pub use context::{ConfirmationContext, ExecutionTicket};
pub use error::ConfirmationError;
pub use machine::{
    ConfirmationConfig, ConfirmationEvent, ConfirmationMachine, ConfirmationState, Gesture,
    Transition,
};
