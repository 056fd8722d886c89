//! Custody execution-authority kernel.
//!
//! An agent may plan freely, but every privileged action it attempts passes
//! through [`EnforcementAdapter`]:
//!
//! 1. **Session**: exactly one human-started session holds authority; losing
//!    focus, locking the screen or any hard stop ends it and revokes everything.
//! 2. **Guard**: the session must be executing, inside its lifetime, and the
//!    human must not have gone silent. Host policy gets a veto.
//! 3. **Confirmation**: irreversible actions need a ticket from a hold-to-arm,
//!    separate-gesture confirmation bound to the exact action.
//! 4. **Grant**: default-deny capability grants, optionally behind a consent
//!    checkpoint.
//! 5. **Gate**: OS-level re-validation (dialogs, window and file identity,
//!    killable exports) right before the effect.
//! 6. **Effect**: handed to the host's [`EffectActuator`].
//!
//! Every step is recorded in a hash-chained audit log.

pub mod adapter;
pub mod config;
pub mod error;
pub mod guard;
pub mod mocks;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use adapter::{EnforcementAdapter, PendingCheckpoint, Platform};
pub use config::{
    ConfirmationSection, ConsentSection, ExportSection, KernelConfig, LoggingConfig,
    SessionSection,
};
pub use error::{ActuatorError, ConfigError};
pub use guard::{ExecutionGuard, GuardReport};
pub use mocks::{MockPlatform, MockPolicy, RecordingActuator};
pub use telemetry::init_tracing;
pub use traits::{EffectActuator, PolicyEvaluator, PolicyViolation};
pub use types::{
    Authorization, AuthorizedEffect, CapabilityRequest, ContextBoundary, EffectOutcome,
    ProposedAction,
};

// Re-exports so hosts depend on one crate.
pub use custody_audit::{AuditEvent, AuditEventType, AuditLog, ChainVerification};
pub use custody_authority::{ChallengeKind, ConsentChallenge, ConsentReceipt, TokenState};
pub use custody_confirm::{
    ConfirmationContext, ConfirmationEvent, ConfirmationMachine, ConfirmationState,
    ExecutionTicket, Gesture,
};
pub use custody_gates::{
    ExportJobHandle, GateClearance, JobSpec, JobStatus, MockJobBehavior, RequestTarget,
    SelectionOrigin, TextField, UserSelection,
};
pub use custody_session::{EndReason, LifecycleEvent, SessionPhase};
pub use custody_types::{
    AuthorityError, Capability, Clock, ConsentFailure, ConsentTokenId, DenyReason,
    FieldClassification, GrantId, HardStopReason, JobId, ManualClock, Scope, SessionId,
    SystemClock, WindowIdentity,
};
