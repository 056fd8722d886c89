use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use custody_audit::{AuditEventType, AuditLog};
use custody_session::{EndReason, RevocationListener, SessionContext};
use custody_types::{
    AuthorityError, Capability, Clock, ConsentFailure, ConsentTokenId, GrantId, SessionId,
};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::receipt::{ConsentReceipt, ReceiptBook};

/// Kind of challenge presented to the human.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeKind {
    /// Type a random code shaped `LLDLLD`.
    TypeCode,
    /// Say a phrase drawn from a fixed list.
    VoicePhrase,
    /// Perform a named physical gesture.
    DeliberateGesture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    Pending,
    Consumed,
    Rejected,
    Dismissed,
    Expired,
    Revoked,
}

const PHRASES: &[&str] = &[
    "i want to continue",
    "yes i understand",
    "lets keep going",
    "im still here",
    "i approve of this",
    "proceed please",
    "this looks good",
];

const GESTURES: &[&str] = &[
    "double_tap_center",
    "swipe_up_then_down",
    "pinch_expand",
    "long_press_3sec",
    "tap_top_left",
];

/// A challenge as shown to the human. Carries no secret beyond what the human sees.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentChallenge {
    pub token: ConsentTokenId,
    pub kind: ChallengeKind,
    pub capability: Capability,
    pub grant: GrantId,
    /// Full instruction text.
    pub prompt: String,
    /// The code, phrase or gesture the human must reproduce.
    pub display: String,
    pub reason: String,
    pub ttl: Duration,
}

#[derive(Debug)]
struct ConsentToken {
    session: SessionId,
    capability: Capability,
    grant: GrantId,
    kind: ChallengeKind,
    expected_hash: String,
    expires_at: Instant,
    state: TokenState,
}

/// Issues and validates single-use consent tokens.
pub struct ConsentCheckpoint {
    session: Arc<SessionContext>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    receipts: Arc<ReceiptBook>,
    token_ttl: Duration,
    tokens: Mutex<HashMap<ConsentTokenId, ConsentToken>>,
}

impl ConsentCheckpoint {
    pub fn new(
        session: Arc<SessionContext>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        receipts: Arc<ReceiptBook>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            session,
            audit,
            clock,
            receipts,
            token_ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh challenge for one use of `grant`.
    pub fn issue(
        &self,
        session: &SessionId,
        capability: Capability,
        grant: GrantId,
        reason: &str,
        kind: ChallengeKind,
    ) -> Result<ConsentChallenge, AuthorityError> {
        self.session.assert_session(session)?;

        let (display, prompt) = generate(kind);
        let token = ConsentTokenId::new();
        let expected_hash = response_hash(kind, &display);

        self.tokens.lock().insert(
            token,
            ConsentToken {
                session: session.clone(),
                capability,
                grant,
                kind,
                expected_hash,
                expires_at: self.clock.now() + self.token_ttl,
                state: TokenState::Pending,
            },
        );

        self.audit.append(
            AuditEventType::ConsentIssued,
            json!({
                "token": token.to_string(),
                "session": session.as_str(),
                "capability": capability,
                "grant": grant.to_string(),
                "kind": kind,
                "reason": reason,
                "ttl_ms": self.token_ttl.as_millis() as u64,
            }),
        );
        info!(session = %session, token = %token, capability = %capability, ?kind, "Consent checkpoint issued");

        Ok(ConsentChallenge {
            token,
            kind,
            capability,
            grant,
            prompt,
            display,
            reason: reason.to_string(),
            ttl: self.token_ttl,
        })
    }

    /// Validate a response. The token is spent by this call whatever the outcome.
    pub fn validate(
        &self,
        session: &SessionId,
        capability: Capability,
        token_id: ConsentTokenId,
        response: &str,
    ) -> Result<ConsentReceipt, AuthorityError> {
        let bound = self.session.assert_session(session);
        let now = self.clock.now();

        let outcome = {
            let mut tokens = self.tokens.lock();
            let token = tokens
                .get_mut(&token_id)
                .ok_or(AuthorityError::ConsentInvalid(ConsentFailure::Unknown(token_id)))?;

            let outcome = match token.state {
                TokenState::Pending => Ok(()),
                TokenState::Consumed | TokenState::Rejected => Err(ConsentFailure::Reused),
                TokenState::Expired => Err(ConsentFailure::Expired),
                TokenState::Dismissed => Err(ConsentFailure::Dismissed),
                TokenState::Revoked => Err(ConsentFailure::Revoked),
            }
            .and_then(|_| {
                if bound.is_err() || &token.session != session {
                    Err(ConsentFailure::WrongSession)
                } else if token.capability != capability {
                    Err(ConsentFailure::WrongCapability {
                        expected: token.capability,
                        presented: capability,
                    })
                } else if now >= token.expires_at {
                    Err(ConsentFailure::Expired)
                } else if response_hash(token.kind, response) != token.expected_hash {
                    Err(ConsentFailure::Mismatch)
                } else {
                    Ok(())
                }
            });

            if token.state == TokenState::Pending {
                token.state = match &outcome {
                    Ok(()) => TokenState::Consumed,
                    Err(ConsentFailure::Expired) => TokenState::Expired,
                    Err(_) => TokenState::Rejected,
                };
            }
            outcome.map(|_| (token.grant, token.capability))
        };

        match outcome {
            Ok((grant, capability)) => {
                self.audit.append(
                    AuditEventType::ConsentValidated,
                    json!({ "token": token_id.to_string(), "capability": capability }),
                );
                info!(token = %token_id, capability = %capability, "Consent validated");
                Ok(self
                    .receipts
                    .mint(token_id, grant, session.clone(), capability))
            }
            Err(failure) => {
                self.audit.append(
                    AuditEventType::ConsentRejected,
                    json!({ "token": token_id.to_string(), "failure": failure.to_string() }),
                );
                warn!(token = %token_id, failure = %failure, "Consent rejected");
                // An unbound session is reported as such rather than as a token problem.
                bound?;
                Err(AuthorityError::ConsentInvalid(failure))
            }
        }
    }

    /// Dismiss a pending checkpoint. The guarded action stays halted.
    pub fn dismiss(&self, token_id: ConsentTokenId) -> Result<(), AuthorityError> {
        let mut tokens = self.tokens.lock();
        let token = tokens
            .get_mut(&token_id)
            .ok_or(AuthorityError::ConsentInvalid(ConsentFailure::Unknown(token_id)))?;
        if token.state != TokenState::Pending {
            return Err(AuthorityError::ConsentInvalid(ConsentFailure::Reused));
        }
        token.state = TokenState::Dismissed;
        drop(tokens);

        self.audit.append(
            AuditEventType::ConsentDismissed,
            json!({ "token": token_id.to_string() }),
        );
        info!(token = %token_id, "Consent checkpoint dismissed");
        Ok(())
    }

    pub fn state(&self, token_id: ConsentTokenId) -> Option<TokenState> {
        self.tokens.lock().get(&token_id).map(|t| t.state)
    }

    pub fn pending(&self) -> usize {
        self.tokens
            .lock()
            .values()
            .filter(|t| t.state == TokenState::Pending)
            .count()
    }

    /// Revoke every pending token of `session`.
    pub fn revoke_session(&self, session: &SessionId) -> usize {
        let mut revoked = 0;
        for token in self.tokens.lock().values_mut() {
            if &token.session == session && token.state == TokenState::Pending {
                token.state = TokenState::Revoked;
                revoked += 1;
            }
        }
        if revoked > 0 {
            self.audit.append(
                AuditEventType::ConsentRevoked,
                json!({ "session": session.as_str(), "count": revoked }),
            );
        }
        revoked
    }
}

impl RevocationListener for ConsentCheckpoint {
    fn listener_name(&self) -> &str {
        "consent-checkpoint"
    }

    fn on_session_end(&self, session: &SessionId, _reason: &EndReason) {
        self.revoke_session(session);
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, t| &t.session != session);
        debug!(session = %session, pruned = before - tokens.len(), "Consent tokens pruned");
    }
}

/// Build a challenge: returns `(display, prompt)`.
fn generate(kind: ChallengeKind) -> (String, String) {
    let mut rng = rand::thread_rng();
    match kind {
        ChallengeKind::TypeCode => {
            let mut code = String::with_capacity(6);
            for slot in 0..6 {
                let c = if slot % 3 == 2 {
                    rng.gen_range(b'0'..=b'9')
                } else {
                    rng.gen_range(b'A'..=b'Z')
                };
                code.push(c as char);
            }
            let prompt = format!("Type this code to continue: {}", code);
            (code, prompt)
        }
        ChallengeKind::VoicePhrase => {
            let phrase = PHRASES[rng.gen_range(0..PHRASES.len())].to_string();
            let prompt = format!("Say this to continue: \"{}\"", phrase);
            (phrase, prompt)
        }
        ChallengeKind::DeliberateGesture => {
            let gesture = GESTURES[rng.gen_range(0..GESTURES.len())].to_string();
            let prompt = format!("Gesture: {}", gesture);
            (gesture, prompt)
        }
    }
}

/// SHA-256 of the normalized response. Spoken phrases are compared
/// case-insensitively with collapsed whitespace; codes and gestures exactly.
fn response_hash(kind: ChallengeKind, response: &str) -> String {
    let normalized = match kind {
        ChallengeKind::VoicePhrase => response
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
        ChallengeKind::TypeCode | ChallengeKind::DeliberateGesture => response.trim().to_string(),
    };
    hex::encode(Sha256::digest(normalized.as_bytes()))
}
