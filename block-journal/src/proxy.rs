//! Provisional views of world state: the overlay stack and the [`ProxyWorld`]
//! read/write facade used while transactions commit.

use core::fmt;

use hashbrown::{HashMap, HashSet};
use log::{error, trace, warn};

use crate::block::{BlockEntity, BlockState, Snapshot};
use crate::flags::ChangeFlags;
use crate::math::Position;
use crate::transaction::TxnId;
use crate::world::World;

/// One level of provisional state, owned by the transaction whose commit
/// pushed it.
#[derive(Clone, Debug)]
struct Overlay {
    owner: TxnId,
    /// States committed through this overlay's window, mirroring authoritative
    /// storage. Merged downward on pop so newer commits stay visible.
    states: HashMap<Position, BlockState>,
    /// Entity attachments staged but not yet applied.
    staged_additions: HashMap<Position, BlockEntity>,
    /// Entity detachments staged but not yet applied.
    staged_removals: HashSet<Position>,
}

impl Overlay {
    fn new(owner: TxnId) -> Self {
        Overlay {
            owner,
            states: HashMap::new(),
            staged_additions: HashMap::new(),
            staged_removals: HashSet::new(),
        }
    }

    fn staged_count(&self) -> usize {
        self.staged_additions.len() + self.staged_removals.len()
    }
}

/// Stack of provisional overlays, one per transaction commit currently on the
/// call stack.
///
/// The stack is owned by the engine; [`ProxyWorld`] views borrow it together
/// with the authoritative [`World`] for the duration of a single operation.
/// Pushes and pops are strictly LIFO and validated against the owning
/// transaction.
#[derive(Clone, Debug, Default)]
pub struct OverlayStack {
    levels: Vec<Overlay>,
}

impl OverlayStack {
    /// Construct an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live overlays.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Whether no overlay is live.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Owner of the newest overlay.
    pub fn top_owner(&self) -> Option<TxnId> {
        self.levels.last().map(|level| level.owner)
    }

    /// Whether any live overlay is owned by `owner`.
    pub fn contains(&self, owner: TxnId) -> bool {
        self.levels.iter().any(|level| level.owner == owner)
    }

    /// Push a fresh overlay owned by `owner`.
    pub fn push(&mut self, owner: TxnId) {
        trace!("overlay push by {owner} (depth {})", self.levels.len() + 1);
        self.levels.push(Overlay::new(owner));
    }

    /// Pop the newest overlay, which must be owned by `owner`.
    ///
    /// Committed states recorded in the popped level are merged into the level
    /// below, so reads keep seeing them. Staged entity operations that were
    /// never applied are discarded with a warning. An out-of-order or
    /// underflowing pop is an invariant violation: the stack is left unchanged
    /// and an error identifying both owners is returned.
    pub fn pop(&mut self, owner: TxnId) -> Result<(), OverlayError> {
        match self.top_owner() {
            Some(top) if top == owner => {
                if let Some(level) = self.levels.pop() {
                    let staged = level.staged_count();
                    if staged > 0 {
                        warn!(
                            "overlay pop by {owner} discards {staged} staged entity operation(s)"
                        );
                    }
                    if let Some(below) = self.levels.last_mut() {
                        below.states.extend(level.states);
                    }
                }
                trace!("overlay pop by {owner} (depth {})", self.levels.len());
                Ok(())
            }
            Some(expected) => {
                let error = OverlayError::OutOfOrder {
                    expected,
                    requested: owner,
                };
                error!("{error}");
                Err(error)
            }
            None => {
                let error = OverlayError::Underflow { requested: owner };
                error!("{error}");
                Err(error)
            }
        }
    }

    fn top_mut(&mut self) -> Option<&mut Overlay> {
        self.levels.last_mut()
    }
}

/// A view of world state that layers the live overlays over authoritative
/// storage.
///
/// Reads fall through newest-overlay-first to the [`World`]; `queue_*` stages
/// provisional entity operations in the newest overlay; `proceed*` makes
/// staged or proposed changes authoritative. Views are constructed per
/// operation and dropped before control returns to host code.
pub struct ProxyWorld<'a> {
    overlays: &'a mut OverlayStack,
    world: &'a mut dyn World,
}

impl fmt::Debug for ProxyWorld<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyWorld")
            .field("overlays", &self.overlays)
            .finish_non_exhaustive()
    }
}

impl<'a> ProxyWorld<'a> {
    /// Construct a view over `overlays` and `world`.
    pub fn new(overlays: &'a mut OverlayStack, world: &'a mut dyn World) -> Self {
        Self { overlays, world }
    }

    /// The state at `position`: newest overlay first, else authoritative
    /// storage.
    pub fn state(&self, position: Position) -> BlockState {
        for level in self.overlays.levels.iter().rev() {
            if let Some(state) = level.states.get(&position) {
                return state.clone();
            }
        }
        self.world.state(position)
    }

    /// The block entity at `position`: staged operations first, else
    /// authoritative storage.
    pub fn block_entity(&self, position: Position) -> Option<BlockEntity> {
        for level in self.overlays.levels.iter().rev() {
            if let Some(entity) = level.staged_additions.get(&position) {
                return Some(entity.clone());
            }
            if level.staged_removals.contains(&position) {
                return None;
            }
        }
        self.world.block_entity(position)
    }

    /// Capture what `position` currently looks like through this view.
    pub fn snapshot(&self, position: Position) -> Snapshot {
        Snapshot::new(position, self.state(position), self.block_entity(position))
    }

    /// Stage a provisional entity attachment in the newest overlay.
    pub fn queue_addition(
        &mut self,
        position: Position,
        entity: BlockEntity,
    ) -> Result<(), OverlayError> {
        let level = self.overlays.top_mut().ok_or(OverlayError::NoOverlay)?;
        trace!("queue addition of {kind} at {position:?}", kind = entity.kind());
        level.staged_removals.remove(&position);
        level.staged_additions.insert(position, entity);
        Ok(())
    }

    /// Stage a provisional entity detachment in the newest overlay.
    pub fn queue_removal(&mut self, position: Position) -> Result<(), OverlayError> {
        let level = self.overlays.top_mut().ok_or(OverlayError::NoOverlay)?;
        trace!("queue removal at {position:?}");
        level.staged_additions.remove(&position);
        level.staged_removals.insert(position);
        Ok(())
    }

    /// Stage a provisional replacement: whatever is bound at `position` is to
    /// be detached and `entity` attached in its place.
    pub fn queue_replacement(
        &mut self,
        position: Position,
        entity: BlockEntity,
    ) -> Result<(), OverlayError> {
        let level = self.overlays.top_mut().ok_or(OverlayError::NoOverlay)?;
        trace!("queue replacement by {kind} at {position:?}", kind = entity.kind());
        level.staged_removals.insert(position);
        level.staged_additions.insert(position, entity);
        Ok(())
    }

    /// Write `state` to authoritative storage, returning the replaced state.
    ///
    /// When an overlay is live the write is also recorded there, keeping
    /// provisional reads in step with storage.
    pub fn proceed(
        &mut self,
        position: Position,
        state: BlockState,
        flags: ChangeFlags,
    ) -> BlockState {
        if let Some(level) = self.overlays.top_mut() {
            level.states.insert(position, state.clone());
        }
        self.world.set_state(position, state, flags)
    }

    /// Apply the staged detachment at `position`, returning the entity that
    /// was bound there.
    pub fn proceed_with_removal(&mut self, position: Position) -> Option<BlockEntity> {
        if let Some(level) = self.overlays.top_mut() {
            level.staged_removals.remove(&position);
        }
        self.world.remove_block_entity(position)
    }

    /// Apply the staged attachment of `entity` at `position`.
    pub fn proceed_with_add(&mut self, position: Position, entity: BlockEntity) {
        if let Some(level) = self.overlays.top_mut() {
            level.staged_additions.remove(&position);
        }
        self.world.add_block_entity(position, entity);
    }

    /// Apply a staged replacement: detach, then attach `entity`, returning the
    /// detached entity.
    pub fn proceed_with_replacement(
        &mut self,
        position: Position,
        entity: BlockEntity,
    ) -> Option<BlockEntity> {
        let removed = self.proceed_with_removal(position);
        self.proceed_with_add(position, entity);
        removed
    }
}

/// Error from misuse of the overlay stack.
///
/// Every variant is a programming error in the engine or the host, never a
/// player-triggerable condition; callers should surface it rather than retry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, displaydoc::Display)]
#[non_exhaustive]
pub enum OverlayError {
    /// overlay pop requested by {requested} but no overlay is live
    Underflow {
        /// The transaction that requested the pop.
        requested: TxnId,
    },

    /// overlay pop requested by {requested} out of order; the newest overlay is owned by {expected}
    OutOfOrder {
        /// Owner of the newest overlay.
        expected: TxnId,
        /// The transaction that requested the pop.
        requested: TxnId,
    },

    /// entity operation staged with no overlay live
    NoOverlay,
}

impl core::error::Error for OverlayError {}
