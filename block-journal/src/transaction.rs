//! [`Transaction`]: one recorded, committable/cancelable world mutation,
//! together with its variant payloads and diagnostics text.

use core::fmt;

use hashbrown::HashMap;

use crate::block::{BlockEntity, BlockState, Snapshot};
use crate::flags::ChangeFlags;
use crate::math::Position;
use crate::util::ConciseDebug;

/// Identity of a [`Transaction`] within its queue.
///
/// Ids are arena indices: stable for the life of the queue, cheap to copy, and
/// printable in diagnostics. They are never reused within one queue.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize)]
pub struct TxnId(usize);

impl TxnId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of this transaction in its queue's recording order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn #{}", self.0)
    }
}

/// What kind of mutation a [`Transaction`] records, with the per-kind payload.
///
/// This is a closed set; the queue, the commit logic, and the side-effect
/// pipeline all dispatch on it by pattern match.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[expect(clippy::exhaustive_enums)]
pub enum TxnKind {
    /// A block entity is being attached to a cell that had none.
    AddBlockEntity {
        /// The entity being attached.
        entity: BlockEntity,
        /// Pre-change capture of the cell.
        snapshot: Snapshot,
    },

    /// A block entity is being detached from its cell.
    RemoveBlockEntity {
        /// The entity being detached.
        entity: BlockEntity,
        /// Pre-change capture of the cell.
        snapshot: Snapshot,
    },

    /// The block entity bound to a cell is being swapped for another.
    ReplaceBlockEntity {
        /// The entity being attached.
        added: BlockEntity,
        /// The entity being detached.
        removed: BlockEntity,
        /// Pre-change capture of the cell.
        snapshot: Snapshot,
    },

    /// A cell's block state is being replaced.
    ChangeBlockState {
        /// Pre-change capture of the cell.
        snapshot: Snapshot,
        /// The state the cell is changing to.
        new_state: BlockState,
        /// Reaction flags requested for this change.
        flags: ChangeFlags,
        /// Entity to detach during commit, staged at capture time.
        queued_removal: Option<BlockEntity>,
        /// Entity to attach during commit, staged at capture time.
        queued_addition: Option<BlockEntity>,
        /// Whether the change replaces the block's kind rather than its
        /// properties.
        kind_changed: bool,
        /// Whether on-add logic should run during commit.
        run_add_logic: bool,
        /// Skip break logic even though the kind changed.
        suppress_break_logic: bool,
        /// If the write flipped the containing section between occupied and
        /// empty, the new emptiness; `None` if the section's status held.
        emptiness_change: Option<bool>,
    },

    /// A cell is to be told that a nearby block changed.
    NeighborNotification {
        /// The cell receiving the notification.
        notify_position: Position,
        /// State of the notified cell when the notification was scheduled.
        notify_state: BlockState,
        /// State of the cell whose change is being announced.
        source_state: BlockState,
        /// The cell whose change is being announced.
        source_position: Position,
    },
}

impl TxnKind {
    /// Diagnostic name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            TxnKind::AddBlockEntity { .. } => "AddBlockEntity",
            TxnKind::RemoveBlockEntity { .. } => "RemoveBlockEntity",
            TxnKind::ReplaceBlockEntity { .. } => "ReplaceBlockEntity",
            TxnKind::ChangeBlockState { .. } => "ChangeBlockState",
            TxnKind::NeighborNotification { .. } => "NeighborNotification",
        }
    }

    /// The position the transaction affects.
    pub fn position(&self) -> Position {
        match self {
            TxnKind::AddBlockEntity { snapshot, .. }
            | TxnKind::RemoveBlockEntity { snapshot, .. }
            | TxnKind::ReplaceBlockEntity { snapshot, .. }
            | TxnKind::ChangeBlockState { snapshot, .. } => snapshot.position,
            TxnKind::NeighborNotification { notify_position, .. } => *notify_position,
        }
    }

    /// The state of the affected cell before the transaction.
    pub fn original_state(&self) -> &BlockState {
        match self {
            TxnKind::AddBlockEntity { snapshot, .. }
            | TxnKind::RemoveBlockEntity { snapshot, .. }
            | TxnKind::ReplaceBlockEntity { snapshot, .. }
            | TxnKind::ChangeBlockState { snapshot, .. } => &snapshot.state,
            TxnKind::NeighborNotification { notify_state, .. } => notify_state,
        }
    }

    /// The pre-change capture, for the kinds that take one.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            TxnKind::AddBlockEntity { snapshot, .. }
            | TxnKind::RemoveBlockEntity { snapshot, .. }
            | TxnKind::ReplaceBlockEntity { snapshot, .. }
            | TxnKind::ChangeBlockState { snapshot, .. } => Some(snapshot),
            TxnKind::NeighborNotification { .. } => None,
        }
    }

    /// Whether this kind merely notifies and leaves the cell untouched.
    pub fn is_notification(&self) -> bool {
        matches!(self, TxnKind::NeighborNotification { .. })
    }

    /// Whether committing this kind stages provisional operations and so needs
    /// its own overlay.
    pub fn needs_overlay(&self) -> bool {
        !self.is_notification()
    }
}

/// One recorded, committable/cancelable mutation of the world.
///
/// Transactions are created by the engine's capture entry points and owned by
/// a [`TransactionQueue`]. They stay in the queue's arena for its whole life:
/// a cancelled node is excised from the links but keeps its data so
/// diagnostics can show what was undone.
///
/// [`TransactionQueue`]: crate::queue::TransactionQueue
#[derive(Clone, Debug, serde::Serialize)]
pub struct Transaction {
    id: TxnId,
    /// Count of same-position transactions recorded earlier in the chain.
    snapshot_index: usize,
    position: Position,
    original: BlockState,
    prev: Option<TxnId>,
    next: Option<TxnId>,
    cancelled: bool,
    /// Whether capture already wrote the change to authoritative storage.
    pre_change_applied: bool,
    /// Entities observed at other touched positions as of this transaction.
    entities_at: HashMap<Position, Option<BlockEntity>>,
    /// States observed at other touched positions as of this transaction.
    preserved_states: HashMap<Position, BlockState>,
    kind: TxnKind,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, snapshot_index: usize, kind: TxnKind) -> Self {
        Transaction {
            id,
            snapshot_index,
            position: kind.position(),
            original: kind.original_state().clone(),
            prev: None,
            next: None,
            cancelled: false,
            pre_change_applied: false,
            entities_at: HashMap::new(),
            preserved_states: HashMap::new(),
            kind,
        }
    }

    /// This transaction's identity within its queue.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Count of same-position transactions recorded earlier in the chain; a
    /// per-position revision number for diagnostics.
    pub fn snapshot_index(&self) -> usize {
        self.snapshot_index
    }

    /// The position this transaction mutates (or, for notifications, targets).
    pub fn position(&self) -> Position {
        self.position
    }

    /// State of the affected cell before this transaction.
    pub fn original(&self) -> &BlockState {
        &self.original
    }

    /// The previous live node in commit order, as linked by the queue.
    pub fn prev(&self) -> Option<TxnId> {
        self.prev
    }

    /// The next live node in commit order, as linked by the queue.
    pub fn next(&self) -> Option<TxnId> {
        self.next
    }

    /// Whether this transaction has been cancelled by a veto.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether capture already wrote this change to authoritative storage,
    /// making commit-time application a replay.
    pub fn pre_change_applied(&self) -> bool {
        self.pre_change_applied
    }

    /// The variant payload.
    pub fn kind(&self) -> &TxnKind {
        &self.kind
    }

    /// Diagnostic name of the variant.
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// The state this transaction observed at `position` before a later
    /// sibling touched it, if one did.
    pub fn preserved_state(&self, position: Position) -> Option<&BlockState> {
        self.preserved_states.get(&position)
    }

    /// The entity this transaction observed at `position` before a later
    /// sibling touched it. The outer `None` means no later sibling recorded
    /// anything there.
    pub fn entity_at(&self, position: Position) -> Option<&Option<BlockEntity>> {
        self.entities_at.get(&position)
    }

    /// Before/after snapshots as shown to the event bus.
    pub fn change_pair(&self) -> ChangePair {
        match &self.kind {
            TxnKind::ChangeBlockState {
                snapshot,
                new_state,
                queued_removal,
                queued_addition,
                ..
            } => {
                let entity_after = match (queued_addition, queued_removal) {
                    (Some(added), _) => Some(added.clone()),
                    (None, Some(_)) => None,
                    (None, None) => snapshot.entity.clone(),
                };
                ChangePair {
                    before: snapshot.clone(),
                    after: Snapshot::new(snapshot.position, new_state.clone(), entity_after),
                }
            }
            TxnKind::AddBlockEntity { entity, snapshot } => ChangePair {
                before: snapshot.clone(),
                after: Snapshot::new(
                    snapshot.position,
                    snapshot.state.clone(),
                    Some(entity.clone()),
                ),
            },
            TxnKind::RemoveBlockEntity { snapshot, .. } => ChangePair {
                before: snapshot.clone(),
                after: Snapshot::new(snapshot.position, snapshot.state.clone(), None),
            },
            TxnKind::ReplaceBlockEntity {
                added, snapshot, ..
            } => ChangePair {
                before: snapshot.clone(),
                after: Snapshot::new(
                    snapshot.position,
                    snapshot.state.clone(),
                    Some(added.clone()),
                ),
            },
            TxnKind::NeighborNotification {
                notify_position,
                notify_state,
                ..
            } => {
                let unchanged = Snapshot::new(*notify_position, notify_state.clone(), None);
                ChangePair {
                    before: unchanged.clone(),
                    after: unchanged,
                }
            }
        }
    }

    pub(crate) fn kind_mut(&mut self) -> &mut TxnKind {
        &mut self.kind
    }

    pub(crate) fn set_prev(&mut self, prev: Option<TxnId>) {
        self.prev = prev;
    }

    pub(crate) fn set_next(&mut self, next: Option<TxnId>) {
        self.next = next;
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn mark_pre_change_applied(&mut self) {
        self.pre_change_applied = true;
    }

    /// Record what `position` held before an intervening sibling changed it.
    /// First write wins; later recordings for the same position are ignored.
    pub(crate) fn record_unchanged(
        &mut self,
        position: Position,
        state: BlockState,
        entity: Option<BlockEntity>,
    ) {
        self.preserved_states.entry(position).or_insert(state);
        self.entities_at.entry(position).or_insert(entity);
    }
}

impl manyfmt::Fmt<ConciseDebug> for Transaction {
    /// One line per transaction, as it appears in chain reports.
    #[mutants::skip]
    fn fmt(&self, f: &mut fmt::Formatter<'_>, _: &ConciseDebug) -> fmt::Result {
        write!(f, "#{} {}", self.id.index(), self.kind.name())?;
        match &self.kind {
            TxnKind::ChangeBlockState {
                snapshot,
                new_state,
                ..
            } => {
                write!(f, " @ {:?} {:?} -> {:?}", snapshot.position, snapshot.state, new_state)?;
            }
            TxnKind::AddBlockEntity { entity, snapshot } => {
                write!(f, " @ {:?} +{}", snapshot.position, entity.kind())?;
            }
            TxnKind::RemoveBlockEntity { entity, snapshot } => {
                write!(f, " @ {:?} -{}", snapshot.position, entity.kind())?;
            }
            TxnKind::ReplaceBlockEntity {
                added,
                removed,
                snapshot,
            } => {
                write!(f, " @ {:?} -{} +{}", snapshot.position, removed.kind(), added.kind())?;
            }
            TxnKind::NeighborNotification {
                notify_position,
                source_state,
                source_position,
                ..
            } => {
                write!(
                    f,
                    " @ {:?} source {:?} {:?}",
                    notify_position, source_position, source_state
                )?;
            }
        }
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        let link = |id: Option<TxnId>| match id {
            Some(id) => format!("#{}", id.index()),
            None => "none".to_owned(),
        };
        write!(f, " (prev {}, next {})", link(self.prev), link(self.next))
    }
}

/// The before/after pair a transaction proposes, as shown to the event bus.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[allow(clippy::exhaustive_structs)]
pub struct ChangePair {
    /// What the cell held before the transaction.
    pub before: Snapshot,
    /// What the cell will hold once the transaction commits.
    pub after: Snapshot,
}
