//! Test doubles: a world that records its reaction hooks, canned phases, and
//! canned event buses.
//!
//! These are public so hosts can reuse them in their own test suites.

use arcstr::ArcStr;
use hashbrown::HashSet;

use crate::block::{BlockEntity, BlockState};
use crate::bus::{EventBus, Proposal, Verdict};
use crate::flags::ChangeFlags;
use crate::journal::Journal;
use crate::math::Position;
use crate::phase::{CapturePolicy, Phase};
use crate::world::{MemoryWorld, World};

/// One reaction-hook invocation, as recorded by [`RecordingWorld`].
///
/// Each variant corresponds to the [`World`] method of the same name and
/// carries the arguments worth asserting on.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum Hook {
    /// [`World::break_block`]
    BreakBlock(Position),
    /// [`World::block_added`]
    BlockAdded(Position),
    /// [`World::neighbor_changed`]
    NeighborChanged {
        /// Cell that was notified.
        position: Position,
        /// Reported origin of the disturbance.
        source: Position,
    },
    /// [`World::shape_updates`]
    ShapeUpdates {
        /// Cell whose change propagates.
        position: Position,
        /// Propagation budget it was given.
        limit: u32,
    },
    /// [`World::diagonal_shape_updates`]
    DiagonalShapeUpdates {
        /// Cell whose change propagates.
        position: Position,
        /// Propagation budget it was given.
        limit: u32,
    },
    /// [`World::pre_detach_entity`]
    PreDetach(Position),
    /// [`World::check_light`]
    CheckLight(Position),
    /// [`World::section_status_changed`]
    SectionStatus {
        /// Origin cell of the section.
        position: Position,
        /// Whether the section became empty.
        empty: bool,
    },
    /// [`World::explosion_destroyed`]
    ExplosionDestroyed(Position),
    /// [`World::notify_changed`]
    NotifyChanged {
        /// Cell that changed.
        position: Position,
        /// Flags the change carried.
        flags: ChangeFlags,
    },
}

/// A [`MemoryWorld`] that additionally records every reaction hook fired at
/// it, in order. Storage operations are not recorded.
#[derive(Debug, Default)]
pub struct RecordingWorld {
    inner: MemoryWorld,
    hooks: Vec<Hook>,
}

impl RecordingWorld {
    /// An empty world with an empty hook log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reaction hook fired so far, oldest first.
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Forget the hooks recorded so far.
    pub fn clear_hooks(&mut self) {
        self.hooks.clear();
    }
}

impl World for RecordingWorld {
    fn state(&self, position: Position) -> BlockState {
        self.inner.state(position)
    }

    fn set_state(
        &mut self,
        position: Position,
        state: BlockState,
        flags: ChangeFlags,
    ) -> BlockState {
        self.inner.set_state(position, state, flags)
    }

    fn block_entity(&self, position: Position) -> Option<BlockEntity> {
        self.inner.block_entity(position)
    }

    fn add_block_entity(&mut self, position: Position, entity: BlockEntity) {
        self.inner.add_block_entity(position, entity);
    }

    fn remove_block_entity(&mut self, position: Position) -> Option<BlockEntity> {
        self.inner.remove_block_entity(position)
    }

    fn section_is_empty(&self, position: Position) -> bool {
        self.inner.section_is_empty(position)
    }

    fn break_block(&mut self, _journal: &mut Journal, position: Position, _old: &BlockState) {
        self.hooks.push(Hook::BreakBlock(position));
    }

    fn block_added(&mut self, _journal: &mut Journal, position: Position, _new: &BlockState) {
        self.hooks.push(Hook::BlockAdded(position));
    }

    fn neighbor_changed(
        &mut self,
        _journal: &mut Journal,
        position: Position,
        _state: &BlockState,
        _source_state: &BlockState,
        source: Position,
    ) {
        self.hooks.push(Hook::NeighborChanged { position, source });
    }

    fn shape_updates(
        &mut self,
        _journal: &mut Journal,
        position: Position,
        _state: &BlockState,
        _flags: ChangeFlags,
        limit: u32,
    ) {
        self.hooks.push(Hook::ShapeUpdates { position, limit });
    }

    fn diagonal_shape_updates(
        &mut self,
        _journal: &mut Journal,
        position: Position,
        _state: &BlockState,
        _flags: ChangeFlags,
        limit: u32,
    ) {
        self.hooks.push(Hook::DiagonalShapeUpdates { position, limit });
    }

    fn pre_detach_entity(&mut self, position: Position, _entity: &BlockEntity) {
        self.hooks.push(Hook::PreDetach(position));
    }

    fn check_light(&mut self, position: Position) {
        self.hooks.push(Hook::CheckLight(position));
    }

    fn section_status_changed(&mut self, position: Position, empty: bool) {
        self.hooks.push(Hook::SectionStatus { position, empty });
    }

    fn explosion_destroyed(
        &mut self,
        _journal: &mut Journal,
        position: Position,
        _state: &BlockState,
    ) {
        self.hooks.push(Hook::ExplosionDestroyed(position));
    }

    fn notify_changed(
        &mut self,
        position: Position,
        _old: &BlockState,
        _new: &BlockState,
        flags: ChangeFlags,
    ) {
        self.hooks.push(Hook::NotifyChanged { position, flags });
    }
}

/// Phase that captures every mutation offered to it.
#[derive(Clone, Debug)]
pub struct CapturingPhase {
    name: ArcStr,
    explosion: bool,
}

impl CapturingPhase {
    /// A capturing phase with the given name.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        CapturingPhase {
            name: name.into(),
            explosion: false,
        }
    }

    /// Mark the phase as explosion-driven.
    #[must_use]
    pub fn explosive(mut self) -> Self {
        self.explosion = true;
        self
    }
}

impl Phase for CapturingPhase {
    fn name(&self) -> ArcStr {
        self.name.clone()
    }

    fn capture_policy(
        &self,
        _position: Position,
        _new_state: &BlockState,
        _flags: ChangeFlags,
    ) -> CapturePolicy {
        CapturePolicy::Capture
    }

    fn is_explosion(&self) -> bool {
        self.explosion
    }
}

/// Phase that applies every mutation directly, bypassing capture.
#[derive(Clone, Debug)]
pub struct DirectPhase {
    name: ArcStr,
}

impl DirectPhase {
    /// A non-capturing phase with the given name.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        DirectPhase { name: name.into() }
    }
}

impl Phase for DirectPhase {
    fn name(&self) -> ArcStr {
        self.name.clone()
    }

    fn capture_policy(
        &self,
        _position: Position,
        _new_state: &BlockState,
        _flags: ChangeFlags,
    ) -> CapturePolicy {
        CapturePolicy::Direct
    }
}

/// Bus that allows every proposal.
pub fn allow_all() -> impl EventBus {
    |proposals: &[Proposal]| vec![Verdict::Allow; proposals.len()]
}

/// Bus that vetoes every proposal.
pub fn veto_all() -> impl EventBus {
    |proposals: &[Proposal]| vec![Verdict::Veto; proposals.len()]
}

/// Bus that vetoes exactly the proposals touching the given positions.
pub fn veto_at(positions: impl IntoIterator<Item = Position>) -> impl EventBus {
    let positions: HashSet<Position> = positions.into_iter().collect();
    move |proposals: &[Proposal]| {
        proposals
            .iter()
            .map(|proposal| {
                if positions.contains(&proposal.pair.before.position) {
                    Verdict::Veto
                } else {
                    Verdict::Allow
                }
            })
            .collect()
    }
}

/// Distinct states from kind names, for terse test setup.
pub fn make_states<const N: usize>(kinds: [&str; N]) -> [BlockState; N] {
    kinds.map(BlockState::new)
}
