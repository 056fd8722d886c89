//! Capability authority and consent checkpoints.
//!
//! [`CapabilityAuthority`] holds the session's grants and answers every
//! capability check with allow, deny or needs-consent. There is no implicit
//! allow: a capability without a live, matching grant is denied.
//!
//! [`ConsentCheckpoint`] issues single-use challenges (ACC tokens). A token is
//! consumed on its first validation attempt whatever the outcome; a successful
//! validation mints a [`ConsentReceipt`] the authority redeems exactly once.

pub mod consent;
pub mod grants;
pub mod receipt;

pub use consent::{ChallengeKind, ConsentChallenge, ConsentCheckpoint, TokenState};
pub use grants::{CapabilityAuthority, Decision};
pub use receipt::{ConsentReceipt, ReceiptBook};
