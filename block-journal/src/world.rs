//! The seam between the journal and the host simulation: authoritative storage
//! plus the host's reaction hooks, as one object-safe trait.

use hashbrown::HashMap;

use crate::block::{BlockEntity, BlockState, VACANT};
use crate::flags::ChangeFlags;
use crate::journal::Journal;
use crate::math::Position;

/// Authoritative world storage and host reactions.
///
/// The storage methods are the ground truth the journal commits into; the
/// reaction methods are how the host hears about committed changes. Reaction
/// defaults are no-ops so a storage-only world is a valid implementation.
///
/// Methods marked *re-entrant* receive the engine handle and may call back into
/// its capture entry points ([`Journal::set_block`] and friends); mutations made
/// that way are captured as nested transactions under the current phase.
///
/// The journal itself writes through these methods only at capture and commit
/// time; everything in between reads through the proxy view.
#[allow(unused_variables)] // default reaction bodies ignore their arguments
pub trait World {
    /// The state of the cell at `position`; [`VACANT`] where nothing is stored.
    fn state(&self, position: Position) -> BlockState;

    /// Replace the state of the cell at `position`, returning the state it
    /// held. Writing [`VACANT`] empties the cell.
    ///
    /// This is a bare storage write: no reactions run. `flags` is recorded so
    /// storage backends that journal their own writes can preserve it.
    fn set_state(&mut self, position: Position, state: BlockState, flags: ChangeFlags)
    -> BlockState;

    /// The entity bound to `position`, if any.
    fn block_entity(&self, position: Position) -> Option<BlockEntity>;

    /// Bind `entity` to `position`, replacing any existing binding.
    fn add_block_entity(&mut self, position: Position, entity: BlockEntity);

    /// Remove and return the entity bound to `position`.
    fn remove_block_entity(&mut self, position: Position) -> Option<BlockEntity>;

    /// Whether the [`SECTION_SIZE`]³ aligned region containing `position` holds
    /// no non-vacant cells.
    ///
    /// [`SECTION_SIZE`]: crate::math::SECTION_SIZE
    fn section_is_empty(&self, position: Position) -> bool;

    /// Break logic for a true kind change: drops, container spills, and
    /// whatever else destroying `old` entails. *Re-entrant.*
    fn break_block(&mut self, journal: &mut Journal, position: Position, old: &BlockState) {}

    /// On-add logic for a newly placed kind. *Re-entrant.*
    fn block_added(&mut self, journal: &mut Journal, position: Position, new: &BlockState) {}

    /// Neighbor physics: the cell at `position` (holding `state`) is told that
    /// the block at `source` changed. *Re-entrant.*
    fn neighbor_changed(
        &mut self,
        journal: &mut Journal,
        position: Position,
        state: &BlockState,
        source_state: &BlockState,
        source: Position,
    ) {
    }

    /// Shape updates for the six face-adjacent cells of `position`.
    /// `limit` is the remaining propagation budget. *Re-entrant.*
    fn shape_updates(
        &mut self,
        journal: &mut Journal,
        position: Position,
        state: &BlockState,
        flags: ChangeFlags,
        limit: u32,
    ) {
    }

    /// Shape updates for diagonally adjacent cells. *Re-entrant.*
    fn diagonal_shape_updates(
        &mut self,
        journal: &mut Journal,
        position: Position,
        state: &BlockState,
        flags: ChangeFlags,
        limit: u32,
    ) {
    }

    /// Called just before the journal detaches `entity` from `position`, while
    /// it is still bound.
    fn pre_detach_entity(&mut self, position: Position, entity: &BlockEntity) {}

    /// The light engine should re-examine `position`.
    fn check_light(&mut self, position: Position) {}

    /// The section containing `position` crossed between empty and occupied.
    fn section_status_changed(&mut self, position: Position, empty: bool) {}

    /// An explosion-phase commit destroyed the block at `position`.
    /// *Re-entrant.*
    fn explosion_destroyed(&mut self, journal: &mut Journal, position: Position, state: &BlockState) {
    }

    /// Ship the committed change to connected clients.
    fn notify_changed(
        &mut self,
        position: Position,
        old: &BlockState,
        new: &BlockState,
        flags: ChangeFlags,
    ) {
    }
}

/// Hash-map-backed [`World`] with no reactions.
///
/// Suitable as the storage layer of a host that implements its reactions in a
/// wrapper, and as the reference storage in tests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryWorld {
    states: HashMap<Position, BlockState>,
    entities: HashMap<Position, BlockEntity>,
    /// Non-vacant cell count per section origin, kept in step with `states`.
    section_counts: HashMap<Position, u32>,
}

impl MemoryWorld {
    /// Construct an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-vacant cells.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the whole world is vacant.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl World for MemoryWorld {
    fn state(&self, position: Position) -> BlockState {
        self.states.get(&position).cloned().unwrap_or(VACANT)
    }

    fn set_state(
        &mut self,
        position: Position,
        state: BlockState,
        _flags: ChangeFlags,
    ) -> BlockState {
        let old = if state.is_vacant() {
            self.states.remove(&position).unwrap_or(VACANT)
        } else {
            self.states.insert(position, state).unwrap_or(VACANT)
        };

        let now_vacant = !self.states.contains_key(&position);
        let was_vacant = old.is_vacant();
        if was_vacant != now_vacant {
            let section = position.section_origin();
            let count = self.section_counts.entry(section).or_insert(0);
            if was_vacant {
                *count += 1;
            } else {
                *count -= 1;
                if *count == 0 {
                    self.section_counts.remove(&section);
                }
            }
        }
        old
    }

    fn block_entity(&self, position: Position) -> Option<BlockEntity> {
        self.entities.get(&position).cloned()
    }

    fn add_block_entity(&mut self, position: Position, entity: BlockEntity) {
        self.entities.insert(position, entity);
    }

    fn remove_block_entity(&mut self, position: Position) -> Option<BlockEntity> {
        self.entities.remove(&position)
    }

    fn section_is_empty(&self, position: Position) -> bool {
        !self.section_counts.contains_key(&position.section_origin())
    }
}
