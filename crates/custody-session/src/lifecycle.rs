use custody_types::HardStopReason;
use serde::{Deserialize, Serialize};

/// Host lifecycle signals delivered to the kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Background,
    ScreenLock,
    FocusLoss,
    Terminated,
    ExplicitEnd,
    HardStop(HardStopReason),
    /// Returning to the foreground never restores a session.
    Foregrounded,
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Backgrounded,
    ScreenLocked,
    FocusLost,
    Terminated,
    Explicit,
    TtlExpired,
    HardStop(HardStopReason),
}

impl LifecycleEvent {
    /// The end reason this event implies, or `None` if it does not end the session.
    pub fn end_reason(&self) -> Option<EndReason> {
        match self {
            LifecycleEvent::Background => Some(EndReason::Backgrounded),
            LifecycleEvent::ScreenLock => Some(EndReason::ScreenLocked),
            LifecycleEvent::FocusLoss => Some(EndReason::FocusLost),
            LifecycleEvent::Terminated => Some(EndReason::Terminated),
            LifecycleEvent::ExplicitEnd => Some(EndReason::Explicit),
            LifecycleEvent::HardStop(reason) => Some(EndReason::HardStop(reason.clone())),
            LifecycleEvent::Foregrounded => None,
        }
    }
}

impl EndReason {
    pub fn is_hard_stop(&self) -> bool {
        matches!(self, EndReason::HardStop(_) | EndReason::TtlExpired)
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::Backgrounded => write!(f, "backgrounded"),
            EndReason::ScreenLocked => write!(f, "screen locked"),
            EndReason::FocusLost => write!(f, "focus lost"),
            EndReason::Terminated => write!(f, "terminated"),
            EndReason::Explicit => write!(f, "ended by user"),
            EndReason::TtlExpired => write!(f, "session lifetime exceeded"),
            EndReason::HardStop(reason) => write!(f, "hard stop: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_foregrounded_keeps_session() {
        let ending = [
            LifecycleEvent::Background,
            LifecycleEvent::ScreenLock,
            LifecycleEvent::FocusLoss,
            LifecycleEvent::Terminated,
            LifecycleEvent::ExplicitEnd,
            LifecycleEvent::HardStop(HardStopReason::WindowGone),
        ];
        for event in ending {
            assert!(event.end_reason().is_some(), "{event:?} should end");
        }
        assert!(LifecycleEvent::Foregrounded.end_reason().is_none());
    }

    #[test]
    fn hard_stop_reason_carried_through() {
        let reason = LifecycleEvent::HardStop(HardStopReason::SensitiveField)
            .end_reason()
            .unwrap();
        assert!(reason.is_hard_stop());
        assert!(!EndReason::Explicit.is_hard_stop());
    }
}
