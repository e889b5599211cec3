//! [`TransactionQueue`]: the ordered chain of transactions captured under one
//! phase context, and the [`ChainReport`] diagnostics rendering of it.

use core::fmt;

use itertools::Itertools as _;
use log::trace;
use manyfmt::Refmt as _;

use crate::transaction::{Transaction, TxnId, TxnKind};
use crate::util::ConciseDebug;

/// Transactions captured under one phase context, in commit order.
///
/// The queue owns its transactions in an arena indexed by [`TxnId`]; the chain
/// structure is a pair of index links per node. Cancelled nodes stay in the
/// arena, excised from the links, so the arena is also the complete history of
/// the context for diagnostics.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct TransactionQueue {
    arena: Vec<Transaction>,
    head: Option<TxnId>,
    tail: Option<TxnId>,
}

impl TransactionQueue {
    /// Construct an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions ever recorded, cancelled included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// First live transaction in commit order.
    pub fn head_id(&self) -> Option<TxnId> {
        self.head
    }

    /// Most recently recorded live transaction.
    pub fn tail_id(&self) -> Option<TxnId> {
        self.tail
    }

    /// Look up a transaction by id.
    pub fn get(&self, id: TxnId) -> Option<&Transaction> {
        self.arena.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: TxnId) -> Option<&mut Transaction> {
        self.arena.get_mut(id.index())
    }

    /// The live tail node, if any.
    pub fn tail(&self) -> Option<&Transaction> {
        self.tail.and_then(|id| self.get(id))
    }

    pub(crate) fn tail_mut(&mut self) -> Option<&mut Transaction> {
        let tail = self.tail?;
        self.get_mut(tail)
    }

    /// Record `kind` as the next transaction in the chain, returning its id.
    ///
    /// The new node is linked after the current tail. Every earlier live
    /// transaction then records, first-write-wins, what the new node's
    /// position held before it: rollback of an earlier node must restore what
    /// that node observed, not a later sibling's output. Duplicate positions
    /// are legal and linked in arrival order.
    pub fn enqueue(&mut self, kind: TxnKind) -> TxnId {
        let id = TxnId::new(self.arena.len());
        let position = kind.position();
        let snapshot_index = self
            .arena
            .iter()
            .filter(|t| t.position() == position && !t.kind().is_notification())
            .count();
        let mut txn = Transaction::new(id, snapshot_index, kind);

        txn.set_prev(self.tail);
        if let Some(tail_id) = self.tail {
            if let Some(tail) = self.arena.get_mut(tail_id.index()) {
                tail.set_next(Some(id));
            }
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);

        if !txn.kind().is_notification() {
            let original = txn.original().clone();
            let original_entity = txn.kind().snapshot().and_then(|s| s.entity.clone());
            for earlier in self.arena.iter_mut().filter(|t| !t.cancelled()) {
                earlier.record_unchanged(position, original.clone(), original_entity.clone());
            }
        }

        trace!("enqueued {}", txn.refmt(&ConciseDebug));
        self.arena.push(txn);
        id
    }

    /// Mark `id` cancelled and excise it from the chain links.
    ///
    /// The live neighbors are relinked to skip the node; the node's own
    /// pointers are left as they were, so diagnostics can show where it sat.
    pub(crate) fn excise(&mut self, id: TxnId) {
        let (prev, next) = match self.arena.get_mut(id.index()) {
            Some(txn) => {
                txn.mark_cancelled();
                (txn.prev(), txn.next())
            }
            None => return,
        };
        if let Some(prev_id) = prev {
            if let Some(prev_txn) = self.arena.get_mut(prev_id.index()) {
                prev_txn.set_next(next);
            }
        }
        if let Some(next_id) = next {
            if let Some(next_txn) = self.arena.get_mut(next_id.index()) {
                next_txn.set_prev(prev);
            }
        }
        if self.head == Some(id) {
            self.head = next;
        }
        if self.tail == Some(id) {
            self.tail = prev;
        }
        trace!("excised {id}");
    }

    /// The live chain in commit order.
    pub fn live(&self) -> impl Iterator<Item = &Transaction> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let txn = self.arena.get(cursor?.index())?;
            cursor = txn.next();
            Some(txn)
        })
    }

    /// Ids of the live chain in commit order.
    pub fn live_ids(&self) -> Vec<TxnId> {
        self.live().map(Transaction::id).collect()
    }

    /// Render the whole chain, cancelled nodes included, for diagnostics.
    pub fn report(&self) -> ChainReport {
        ChainReport {
            recorded: self.arena.len(),
            cancelled: self.arena.iter().filter(|t| t.cancelled()).count(),
            lines: self
                .arena
                .iter()
                .map(|t| t.refmt(&ConciseDebug).to_string())
                .collect(),
        }
    }
}

/// An owned, printable rendering of a queue's transaction chain, used in
/// depth-limit errors and loggable on demand.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct ChainReport {
    recorded: usize,
    cancelled: usize,
    lines: Vec<String>,
}

impl ChainReport {
    /// Number of transactions the chain recorded, cancelled included.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Number of cancelled transactions in the chain.
    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl fmt::Display for ChainReport {
    #[mutants::skip]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction chain: {} recorded, {} cancelled",
            self.recorded, self.cancelled
        )?;
        if !self.lines.is_empty() {
            write!(f, "\n  {}", self.lines.iter().format("\n  "))?;
        }
        Ok(())
    }
}
