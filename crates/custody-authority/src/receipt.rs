use std::collections::HashMap;

use chrono::{DateTime, Utc};
use custody_types::{Capability, ConsentFailure, ConsentTokenId, GrantId, SessionId};
use parking_lot::Mutex;

/// Proof that a consent token was validated.
///
/// Only this crate can mint one, and it is neither `Clone` nor `Copy`: handing
/// it to [`ReceiptBook::redeem`] uses it up.
#[derive(Debug, PartialEq, Eq)]
pub struct ConsentReceipt {
    token: ConsentTokenId,
    grant: GrantId,
    session: SessionId,
    capability: Capability,
    validated_at: DateTime<Utc>,
}

impl ConsentReceipt {
    pub fn token(&self) -> ConsentTokenId {
        self.token
    }

    pub fn grant(&self) -> GrantId {
        self.grant
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }
}

#[derive(Clone, Debug)]
struct Outstanding {
    grant: GrantId,
    session: SessionId,
    capability: Capability,
}

/// Outstanding, unredeemed receipts.
///
/// Shared between the checkpoint that mints receipts and the authority that
/// redeems them. Cleared per session on session end.
#[derive(Debug, Default)]
pub struct ReceiptBook {
    outstanding: Mutex<HashMap<ConsentTokenId, Outstanding>>,
}

impl ReceiptBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mint(
        &self,
        token: ConsentTokenId,
        grant: GrantId,
        session: SessionId,
        capability: Capability,
    ) -> ConsentReceipt {
        self.outstanding.lock().insert(
            token,
            Outstanding {
                grant,
                session: session.clone(),
                capability,
            },
        );
        ConsentReceipt {
            token,
            grant,
            session,
            capability,
            validated_at: Utc::now(),
        }
    }

    /// Redeem a receipt for one use of `grant`.
    ///
    /// The receipt is burned even when it does not match.
    pub fn redeem(
        &self,
        receipt: ConsentReceipt,
        session: &SessionId,
        capability: Capability,
        grant: GrantId,
    ) -> Result<(), ConsentFailure> {
        let entry = self
            .outstanding
            .lock()
            .remove(&receipt.token)
            .ok_or(ConsentFailure::BadReceipt)?;

        let matches = entry.grant == receipt.grant
            && entry.session == receipt.session
            && entry.capability == receipt.capability
            && &entry.session == session
            && entry.capability == capability
            && entry.grant == grant;
        if matches {
            Ok(())
        } else {
            Err(ConsentFailure::BadReceipt)
        }
    }

    /// Drop every outstanding receipt for `session`. Returns how many were dropped.
    pub fn clear_session(&self, session: &SessionId) -> usize {
        let mut outstanding = self.outstanding.lock();
        let before = outstanding.len();
        outstanding.retain(|_, o| &o.session != session);
        before - outstanding.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_redeems_once() {
        let book = ReceiptBook::new();
        let token = ConsentTokenId::new();
        let grant = GrantId::new();
        let session = SessionId::from("s");

        let receipt = book.mint(token, grant, session.clone(), Capability::FileWrite);
        assert!(book
            .redeem(receipt, &session, Capability::FileWrite, grant)
            .is_ok());

        // A copy rebuilt for the same token is refused after redemption.
        let forged = ConsentReceipt {
            token,
            grant,
            session: session.clone(),
            capability: Capability::FileWrite,
            validated_at: Utc::now(),
        };
        assert_eq!(
            book.redeem(forged, &session, Capability::FileWrite, grant),
            Err(ConsentFailure::BadReceipt)
        );
    }

    #[test]
    fn mismatched_redeem_burns_receipt() {
        let book = ReceiptBook::new();
        let grant = GrantId::new();
        let session = SessionId::from("s");
        let receipt = book.mint(
            ConsentTokenId::new(),
            grant,
            session.clone(),
            Capability::FileWrite,
        );

        assert_eq!(
            book.redeem(receipt, &session, Capability::RenderExport, grant),
            Err(ConsentFailure::BadReceipt)
        );
        assert_eq!(book.outstanding(), 0);
    }

    #[test]
    fn session_clear_drops_only_that_session() {
        let book = ReceiptBook::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        let _ra = book.mint(ConsentTokenId::new(), GrantId::new(), a.clone(), Capability::FileWrite);
        let _rb = book.mint(ConsentTokenId::new(), GrantId::new(), b, Capability::FileWrite);

        assert_eq!(book.clear_session(&a), 1);
        assert_eq!(book.outstanding(), 1);
    }
}
