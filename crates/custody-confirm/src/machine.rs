use std::sync::Arc;
use std::time::{Duration, Instant};

use custody_audit::{AuditEventType, AuditLog};
use custody_types::Clock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::{ConfirmationContext, ExecutionTicket};
use crate::error::ConfirmationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationState {
    Generated,
    Visible,
    Armed,
    ConfirmReady,
    Executed,
    Rejected,
    Expired,
}

impl ConfirmationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConfirmationState::Executed | ConfirmationState::Rejected | ConfirmationState::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationState::Generated => "GENERATED",
            ConfirmationState::Visible => "VISIBLE",
            ConfirmationState::Armed => "ARMED",
            ConfirmationState::ConfirmReady => "CONFIRM_READY",
            ConfirmationState::Executed => "EXECUTED",
            ConfirmationState::Rejected => "REJECTED",
            ConfirmationState::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical input channel a signal arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    PointerHold,
    KeyHold,
    PointerClick,
    KeyPress,
    Voice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationEvent {
    Show,
    HoldStart { gesture: Gesture },
    HoldRelease { gesture: Gesture },
    PresentConfirm,
    Confirm { gesture: Gesture },
    Reject,
    /// Re-evaluate expiry without other input.
    Tick,
}

impl ConfirmationEvent {
    fn name(&self) -> &'static str {
        match self {
            ConfirmationEvent::Show => "Show",
            ConfirmationEvent::HoldStart { .. } => "HoldStart",
            ConfirmationEvent::HoldRelease { .. } => "HoldRelease",
            ConfirmationEvent::PresentConfirm => "PresentConfirm",
            ConfirmationEvent::Confirm { .. } => "Confirm",
            ConfirmationEvent::Reject => "Reject",
            ConfirmationEvent::Tick => "Tick",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Minimum continuous hold before the machine arms.
    pub min_hold: Duration,
    /// Machines older than this expire on their next event.
    pub ttl: Duration,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            min_hold: Duration::from_millis(400),
            ttl: Duration::from_secs(120),
        }
    }
}

/// Result of an accepted event.
#[derive(Debug)]
pub struct Transition {
    pub from: ConfirmationState,
    pub to: ConfirmationState,
    /// Present only on the single transition into `EXECUTED`.
    pub ticket: Option<ExecutionTicket>,
}

#[derive(Clone, Copy, Debug)]
struct Hold {
    gesture: Gesture,
    started: Instant,
}

/// One confirmation for one proposed action.
pub struct ConfirmationMachine {
    context: ConfirmationContext,
    config: ConfirmationConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLog>,
    state: ConfirmationState,
    created: Instant,
    hold: Option<Hold>,
    armed_by: Option<Gesture>,
}

impl ConfirmationMachine {
    pub fn new(
        context: ConfirmationContext,
        config: ConfirmationConfig,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let created = clock.now();
        Self {
            context,
            config,
            clock,
            audit,
            state: ConfirmationState::Generated,
            created,
            hold: None,
            armed_by: None,
        }
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    pub fn context(&self) -> &ConfirmationContext {
        &self.context
    }

    /// Apply `event`, given the context the caller currently holds.
    pub fn transition(
        &mut self,
        event: ConfirmationEvent,
        current: &ConfirmationContext,
    ) -> Result<Transition, ConfirmationError> {
        let from = self.state;

        if from.is_terminal() {
            return match (from, event) {
                // A repeated confirm after execution changes nothing and records nothing.
                (ConfirmationState::Executed, ConfirmationEvent::Confirm { .. }) => {
                    debug!(context = %self.context.context_id, "Duplicate confirm ignored");
                    Ok(Transition {
                        from,
                        to: from,
                        ticket: None,
                    })
                }
                _ => Err(ConfirmationError::Terminal(from)),
            };
        }

        if current != &self.context {
            warn!(context = %self.context.context_id, "Bound context changed; confirmation expired");
            return Ok(self.expire("context changed"));
        }

        if self.clock.now().saturating_duration_since(self.created) >= self.config.ttl {
            return Ok(self.expire("ttl elapsed"));
        }

        let illegal = ConfirmationError::IllegalEvent {
            state: from,
            event: event.name(),
        };

        match (from, event) {
            (_, ConfirmationEvent::Tick) => Ok(Transition {
                from,
                to: from,
                ticket: None,
            }),

            (_, ConfirmationEvent::Reject) => {
                self.hold = None;
                Ok(self.enter(ConfirmationState::Rejected, "rejected"))
            }

            (ConfirmationState::Generated, ConfirmationEvent::Show) => {
                Ok(self.enter(ConfirmationState::Visible, "shown"))
            }

            (ConfirmationState::Visible, ConfirmationEvent::HoldStart { gesture }) => {
                if self.hold.is_some() {
                    return Err(illegal);
                }
                self.hold = Some(Hold {
                    gesture,
                    started: self.clock.now(),
                });
                Ok(Transition {
                    from,
                    to: from,
                    ticket: None,
                })
            }

            (ConfirmationState::Visible, ConfirmationEvent::HoldRelease { gesture }) => {
                let hold = self.hold.ok_or(illegal)?;
                if hold.gesture != gesture {
                    return Err(ConfirmationError::GestureMismatch);
                }
                self.hold = None;

                let held = self.clock.now().saturating_duration_since(hold.started);
                if held >= self.config.min_hold {
                    self.armed_by = Some(gesture);
                    Ok(self.enter(ConfirmationState::Armed, "hold complete"))
                } else {
                    debug!(
                        context = %self.context.context_id,
                        held_ms = held.as_millis() as u64,
                        "Hold released early"
                    );
                    Ok(Transition {
                        from,
                        to: ConfirmationState::Visible,
                        ticket: None,
                    })
                }
            }

            (ConfirmationState::Armed, ConfirmationEvent::PresentConfirm) => {
                Ok(self.enter(ConfirmationState::ConfirmReady, "confirm presented"))
            }

            (ConfirmationState::ConfirmReady, ConfirmationEvent::Confirm { gesture }) => {
                if Some(gesture) == self.armed_by {
                    return Err(ConfirmationError::SameGesture);
                }
                self.state = ConfirmationState::Executed;
                let ticket = ExecutionTicket::issue(&self.context);
                self.audit.append(
                    AuditEventType::ConfirmationExecuted,
                    json!({
                        "context": self.context.context_id,
                        "session": self.context.session.as_str(),
                        "source_hash": self.context.source_hash,
                        "gesture": gesture,
                    }),
                );
                info!(context = %self.context.context_id, "Confirmation executed");
                Ok(Transition {
                    from,
                    to: ConfirmationState::Executed,
                    ticket: Some(ticket),
                })
            }

            _ => Err(illegal),
        }
    }

    fn enter(&mut self, to: ConfirmationState, reason: &str) -> Transition {
        let from = self.state;
        self.state = to;
        self.audit.append(
            AuditEventType::ConfirmationTransition,
            json!({
                "context": self.context.context_id,
                "from": from,
                "to": to,
                "reason": reason,
            }),
        );
        Transition {
            from,
            to,
            ticket: None,
        }
    }

    fn expire(&mut self, reason: &str) -> Transition {
        self.hold = None;
        self.enter(ConfirmationState::Expired, reason)
    }
}

impl std::fmt::Debug for ConfirmationMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationMachine")
            .field("context", &self.context.context_id)
            .field("state", &self.state)
            .finish()
    }
}
