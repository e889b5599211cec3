//! The outbound seam to the host's cancelable-event bus.
//!
//! The engine builds one batch of [`Proposal`]s per flushed context and asks
//! the bus for one [`Verdict`] per proposal. The bus's own event types are the
//! host's business; this module owns only the exchange format.

use crate::cause::Cause;
use crate::transaction::{ChangePair, TxnId};

/// One reviewable change: a transaction's before/after pair plus attribution.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[non_exhaustive]
pub struct Proposal {
    /// The transaction under review.
    pub id: TxnId,
    /// Its before/after snapshots.
    pub pair: ChangePair,
    /// Why the change happened.
    pub cause: Cause,
}

impl Proposal {
    pub(crate) fn new(id: TxnId, pair: ChangePair, cause: Cause) -> Self {
        Self { id, pair, cause }
    }
}

/// Review outcome for one [`Proposal`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum Verdict {
    /// Let the transaction commit.
    Allow,
    /// Cancel the transaction and restore its snapshot.
    Veto,
}

/// A cancelable-event bus.
///
/// `review` receives the whole batch for one flushed context in chain order
/// and must return exactly one verdict per proposal, in the same order; a
/// count mismatch is treated by the engine as an invariant violation.
pub trait EventBus {
    /// Review `proposals`, returning one verdict each.
    fn review(&mut self, proposals: &[Proposal]) -> Vec<Verdict>;
}

impl<F> EventBus for F
where
    F: FnMut(&[Proposal]) -> Vec<Verdict>,
{
    fn review(&mut self, proposals: &[Proposal]) -> Vec<Verdict> {
        self(proposals)
    }
}
