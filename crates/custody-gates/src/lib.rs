//! Enforcement gates for the Custody kernel.
//!
//! A gate is the last OS-facing check before an authorized effect. Each gate
//! re-validates preconditions on every call and caches nothing:
//!
//! 1. **Preflight** ([`GateBase::preflight`]): the request's session must be
//!    the bound one, and no OS-native modal may be visible.
//! 2. **UI** ([`UiGate`]): the target window must be the one bound at first
//!    use, compared field by field; text input needs a field classification.
//! 3. **File** ([`FileGate`]): only user-selected paths are reachable, and the
//!    on-disk identity must match the bookmark at every access.
//! 4. **Export** ([`ExportJobController`]): jobs run in their own process
//!    group and cancellation is verified by watching the output settle.
//!
//! Platform specifics live behind [`DialogProbe`], [`WindowProbe`] and
//! [`JobLauncher`].

pub mod base;
pub mod dialog;
pub mod gates;
pub mod mocks;
pub mod process;
pub mod request;
pub mod stability;
pub mod traits;

pub use base::GateBase;
pub use dialog::DialogWatcher;
pub use gates::export::{ExportConfig, ExportJobController, ExportJobHandle, JobSpec, JobStatus};
pub use gates::file::{Bookmark, BookmarkTarget, FileGate, SelectionOrigin, UserSelection};
pub use gates::ui::UiGate;
pub use mocks::{
    MockDialogProbe, MockFieldClassifier, MockJobBehavior, MockJobLauncher, MockWindowProbe,
};
#[cfg(unix)]
pub use process::ProcessGroupLauncher;
pub use request::{GateClearance, GateRequest, RequestTarget, TextField};
pub use stability::{OutputSnapshot, PollOutcome, StabilityPoller};
pub use traits::{
    DialogProbe, EnforcementGate, FieldClassifier, JobLauncher, JobProcess, WindowProbe,
};
