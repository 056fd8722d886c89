use custody_types::AuthorityError;
use thiserror::Error;

use crate::machine::ConfirmationState;

/// Errors from driving a confirmation machine. State is unchanged on error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("event {event} not accepted in state {state}")]
    IllegalEvent {
        state: ConfirmationState,
        event: &'static str,
    },

    #[error("confirmation already {0}")]
    Terminal(ConfirmationState),

    #[error("confirm gesture must differ from the arming gesture")]
    SameGesture,

    #[error("hold released with a different gesture than it started with")]
    GestureMismatch,
}

impl From<ConfirmationError> for AuthorityError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::IllegalEvent { state, event } => AuthorityError::IllegalTransition {
                from: state.to_string(),
                to: event.to_string(),
            },
            other => AuthorityError::IllegalTransition {
                from: "confirmation".to_string(),
                to: other.to_string(),
            },
        }
    }
}
