use std::io;

use custody_types::{AuthorityError, Capability, FieldClassification, WindowIdentity};

use crate::gates::export::JobSpec;
use crate::request::{GateClearance, GateRequest};

/// A per-capability enforcement gate.
pub trait EnforcementGate: Send + Sync {
    /// Gate name (for logging and audit).
    fn name(&self) -> &str;

    /// Whether this gate enforces `capability`.
    fn handles(&self, capability: Capability) -> bool;

    /// Re-validate every OS-level precondition for `request`.
    fn enforce(&self, request: &GateRequest) -> Result<GateClearance, AuthorityError>;
}

/// Platform probe for OS-native modal dialogs.
pub trait DialogProbe: Send + Sync {
    /// Title of a visible system modal, if any.
    fn visible_modal(&self) -> Option<String>;
}

/// Platform probe for live window identities.
pub trait WindowProbe: Send + Sync {
    /// Current identity of the window with `window_number`, or `None` if it is gone.
    fn live_identity(&self, window_number: u64) -> Option<WindowIdentity>;
}

/// Optional second opinion on a text field's sensitivity.
pub trait FieldClassifier: Send + Sync {
    fn classify(&self, window: &WindowIdentity, field_id: &str) -> FieldClassification;
}

/// Starts export jobs.
pub trait JobLauncher: Send + Sync {
    fn launch(&self, spec: &JobSpec) -> io::Result<Box<dyn JobProcess>>;
}

/// A running export job and every worker it spawned.
pub trait JobProcess: Send {
    /// Process (and process group) id.
    fn id(&self) -> u32;

    /// Ask the whole group to stop (SIGTERM).
    fn terminate_group(&mut self) -> io::Result<()>;

    /// Force the whole group down (SIGKILL).
    fn kill_group(&mut self) -> io::Result<()>;

    /// Reap the leader if it exited. Returns `true` once it has.
    fn try_reap(&mut self) -> io::Result<bool>;

    /// Whether any member of the group is still alive. The leader exiting
    /// does not empty the group; its workers may outlive it.
    fn group_alive(&mut self) -> io::Result<bool>;
}
