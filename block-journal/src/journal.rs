//! [`Journal`]: the engine tying capture, phases, overlays, the event bus,
//! and the side-effect pipeline together.
//!
//! A host drives it in three movements: [`Journal::enter`] a [`PhaseContext`]
//! when a mutating code path begins, route every world mutation through the
//! capture entry points ([`Journal::set_block`] and friends), and
//! [`Journal::complete`] the context when the path returns. Completion offers
//! the captured transactions to the event bus, cancels the vetoed ones, and
//! processes the survivors together with everything they cascade into.

use arcstr::ArcStr;
use hashbrown::HashSet;
use log::{debug, error, trace, warn};

use crate::block::{BlockEntity, BlockState, Snapshot};
use crate::bus::{EventBus, Proposal, Verdict};
use crate::cause::{Cause, CauseStack};
use crate::effect::{EffectCtx, Pipeline};
use crate::flags::ChangeFlags;
use crate::math::Position;
use crate::phase::{CapturePolicy, PhaseContext, PhaseStack, Restore, Unwind};
use crate::proxy::{OverlayError, OverlayStack, ProxyWorld};
use crate::queue::{ChainReport, TransactionQueue};
use crate::transaction::{TxnId, TxnKind};
use crate::world::World;

/// Tunable limits and diagnostics switches, carried by the engine.
///
/// Hosts can embed this in their own configuration files; absent fields take
/// the defaults.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// Transaction-processing depth at which a feedback loop is declared and
    /// the operation aborted.
    pub max_depth: usize,
    /// Propagation budget for neighbor shape updates.
    pub shape_update_limit: u32,
    /// Log every depth-ceiling abort, not just the first per phase name.
    pub verbose_diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_depth: 100,
            shape_update_limit: 512,
            verbose_diagnostics: false,
        }
    }
}

/// Summary counts from one [`Journal::complete`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
#[non_exhaustive]
pub struct FlushStats {
    /// Transactions of the flushed context committed, in chain order.
    pub committed: usize,
    /// Transactions the event bus vetoed, cancelled and rolled back.
    pub vetoed: usize,
    /// Nested transactions captured and drained while processing, neighbor
    /// notifications included.
    pub nested: usize,
}

/// Error from the engine.
///
/// Apart from [`JournalError::DepthLimit`], every variant is a programming
/// error (an invariant violation), never a player-triggerable condition.
#[derive(Clone, Debug, Eq, PartialEq, displaydoc::Display)]
#[non_exhaustive]
pub enum JournalError {
    /// transaction processing exceeded depth {depth} in phase {phase}
    DepthLimit {
        /// The depth at which processing was aborted.
        depth: usize,
        /// Name of the phase that was current at the abort.
        phase: ArcStr,
        /// The offending context's whole chain, pre-rendered.
        report: ChainReport,
    },

    /// {0}
    Overlay(OverlayError),

    /// flush requested with no phase context active
    NoContext,

    /// event bus returned {returned} verdicts for {expected} proposals
    VerdictCount {
        /// Proposals offered to the bus.
        expected: usize,
        /// Verdicts it returned.
        returned: usize,
    },
}

impl core::error::Error for JournalError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            JournalError::Overlay(error) => Some(error),
            JournalError::DepthLimit { .. }
            | JournalError::NoContext
            | JournalError::VerdictCount { .. } => None,
        }
    }
}

impl From<OverlayError> for JournalError {
    fn from(error: OverlayError) -> Self {
        JournalError::Overlay(error)
    }
}

/// The transactional world-mutation engine.
///
/// Owns the phase stack, the cause stack, the overlay stack, and the
/// side-effect pipeline. It is explicitly threaded: hosts pass `&mut Journal`
/// down every mutating code path, and re-entrant reaction hooks receive the
/// same handle so cascading mutations flow back through capture.
///
/// The engine is single-threaded by design; see the crate docs.
#[derive(Debug, Default)]
pub struct Journal {
    phases: PhaseStack,
    causes: CauseStack,
    overlays: OverlayStack,
    pipeline: Pipeline,
    config: Config,
    /// Phase names whose depth-ceiling abort has already been logged.
    depth_reported: HashSet<ArcStr>,
}

impl Journal {
    /// Construct an engine with the default [`Config`] and the standard
    /// pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replace the side-effect pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The stack of active phase contexts.
    pub fn phases(&self) -> &PhaseStack {
        &self.phases
    }

    /// The attribution stack.
    pub fn causes(&self) -> &CauseStack {
        &self.causes
    }

    /// Mutable access to the attribution stack, for pushing host cause frames.
    pub fn causes_mut(&mut self) -> &mut CauseStack {
        &mut self.causes
    }

    /// The live overlay stack. Outside of transaction processing it is empty.
    pub fn overlays(&self) -> &OverlayStack {
        &self.overlays
    }

    /// A proxy view over the live overlays and `world`, for provisional reads.
    pub fn view<'a>(&'a mut self, world: &'a mut dyn World) -> ProxyWorld<'a> {
        ProxyWorld::new(&mut self.overlays, world)
    }

    /// Run `f` with `cause` as the current attribution frame.
    ///
    /// The frame is removed when `f` returns, even if `f` pushed further
    /// frames and forgot them.
    pub fn with_cause<R>(&mut self, cause: Cause, f: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.causes.depth();
        self.causes.push(cause);
        let result = f(self);
        self.causes.truncate(depth);
        result
    }

    /// Begin a phase: push `context` so subsequent mutations capture under it.
    pub fn enter(&mut self, context: PhaseContext) {
        trace!(
            "entering phase {} (depth {})",
            context.phase().name(),
            self.phases.depth() + 1
        );
        self.phases.push(context);
    }

    /// End the current phase: pop its context, offer the captured transactions
    /// to `bus`, cancel the vetoed ones in reverse chain order, and process
    /// the survivors to completion.
    ///
    /// Nested mutations captured while processing (from re-entrant reaction
    /// hooks and neighbor notifications) drain in the same call; they are not
    /// offered to the bus. A hook that wants veto semantics for its own
    /// changes can itself `enter` and `complete` a nested context.
    pub fn complete(
        &mut self,
        world: &mut dyn World,
        bus: &mut dyn EventBus,
    ) -> Result<FlushStats, JournalError> {
        let Some(mut context) = self.phases.pop() else {
            let error = JournalError::NoContext;
            error!("{error}");
            return Err(error);
        };
        let phase = context.phase_handle();
        let mut queue = context.take_queue();

        let live = queue.live_ids();
        if live.is_empty() {
            debug!("flushed phase {}: nothing captured", phase.name());
            return Ok(FlushStats::default());
        }

        let cause = context
            .source()
            .cloned()
            .or_else(|| self.causes.current().cloned())
            .unwrap_or_else(|| {
                warn!(
                    "flushing phase {} with no cause attached; attributing to unknown",
                    phase.name()
                );
                Cause::unknown()
            });

        let proposals: Vec<Proposal> = live
            .iter()
            .filter_map(|&id| queue.get(id))
            .map(|txn| Proposal::new(txn.id(), txn.change_pair(), cause.clone()))
            .collect();
        let verdicts = bus.review(&proposals);
        if verdicts.len() != proposals.len() {
            let error = JournalError::VerdictCount {
                expected: proposals.len(),
                returned: verdicts.len(),
            };
            error!("{error}");
            return Err(error);
        }

        // Reverse order, so stacked changes at one position unwind newest
        // first and each restore lands on the state its transaction observed.
        let vetoed_ids: Vec<TxnId> = proposals
            .iter()
            .zip(&verdicts)
            .filter(|&(_, verdict)| *verdict == Verdict::Veto)
            .map(|(proposal, _)| proposal.id)
            .collect();
        for &id in vetoed_ids.iter().rev() {
            self.cancel(&mut queue, id, world)?;
        }

        let mut unwind = PhaseContext::new(Unwind::wrapping(&*phase));
        if let Some((position, state)) = context.notification_source() {
            unwind = unwind.with_notification_source(*position, state.clone());
        }
        self.phases.push(unwind);
        let result = self.run_chain(&mut queue, &live, world);
        self.phases.pop();

        let (committed, nested) = result?;
        let stats = FlushStats {
            committed,
            vetoed: vetoed_ids.len(),
            nested,
        };
        debug!(
            "flushed phase {}: {} committed, {} vetoed, {} nested",
            phase.name(),
            stats.committed,
            stats.vetoed,
            stats.nested
        );
        Ok(stats)
    }

    /// Change the block state at `position`, honoring the current capture
    /// policy. Returns the replaced state.
    ///
    /// Under a capturing context the write is applied to authoritative storage
    /// immediately (write-through) and a transaction records how to undo it;
    /// reactions are deferred to [`Journal::complete`]. Otherwise the write
    /// applies directly and its reactions run on the spot.
    pub fn set_block(
        &mut self,
        world: &mut dyn World,
        position: Position,
        new_state: BlockState,
        flags: ChangeFlags,
    ) -> BlockState {
        match self.policy(position, &new_state, flags) {
            CapturePolicy::Capture => self.capture_change(world, position, new_state, flags),
            CapturePolicy::Direct => self.apply_direct(world, position, &new_state, flags),
        }
    }

    /// Bind `entity` to `position`, honoring the current capture policy.
    /// Returns the entity it displaced, if one was bound — the operation is
    /// then recorded as a replacement.
    ///
    /// Arriving while the chain's tail is an uncommitted state change at the
    /// same position, the binding folds into that transaction as its queued
    /// addition instead of opening a new node.
    pub fn add_block_entity(
        &mut self,
        world: &mut dyn World,
        position: Position,
        entity: BlockEntity,
    ) -> Option<BlockEntity> {
        let snapshot = self.view(world).snapshot(position);
        let displaced = snapshot.entity.clone();
        let policy = self.policy(position, &snapshot.state, ChangeFlags::empty());

        if let Some(old) = &displaced {
            world.pre_detach_entity(position, old);
        }
        self.view(world).proceed_with_add(position, entity.clone());

        if policy == CapturePolicy::Capture {
            if let Some(ctx) = self.phases.current_mut() {
                let queue = ctx.queue_mut();
                if Self::folds_into_tail(queue, position) {
                    if let Some(TxnKind::ChangeBlockState {
                        snapshot,
                        queued_removal,
                        queued_addition,
                        ..
                    }) = queue.tail_mut().map(|tail| tail.kind_mut())
                    {
                        if queued_removal.is_none() {
                            queued_removal.clone_from(&snapshot.entity);
                        }
                        *queued_addition = Some(entity);
                    }
                } else {
                    let kind = match displaced.clone() {
                        Some(removed) => TxnKind::ReplaceBlockEntity {
                            added: entity,
                            removed,
                            snapshot,
                        },
                        None => TxnKind::AddBlockEntity { entity, snapshot },
                    };
                    let id = queue.enqueue(kind);
                    if let Some(txn) = queue.get_mut(id) {
                        txn.mark_pre_change_applied();
                    }
                }
            }
        }
        displaced
    }

    /// Remove the entity bound to `position`, honoring the current capture
    /// policy. Returns the removed entity; with nothing bound this records
    /// nothing and returns `None`.
    pub fn remove_block_entity(
        &mut self,
        world: &mut dyn World,
        position: Position,
    ) -> Option<BlockEntity> {
        let snapshot = self.view(world).snapshot(position);
        let existing = snapshot.entity.clone()?;
        let policy = self.policy(position, &snapshot.state, ChangeFlags::empty());

        world.pre_detach_entity(position, &existing);
        let removed = self.view(world).proceed_with_removal(position);

        if policy == CapturePolicy::Capture {
            if let Some(ctx) = self.phases.current_mut() {
                let queue = ctx.queue_mut();
                if Self::folds_into_tail(queue, position) {
                    if let Some(TxnKind::ChangeBlockState {
                        snapshot,
                        queued_removal,
                        queued_addition,
                        ..
                    }) = queue.tail_mut().map(|tail| tail.kind_mut())
                    {
                        if queued_removal.is_none() {
                            queued_removal.clone_from(&snapshot.entity);
                        }
                        *queued_addition = None;
                    }
                } else {
                    let id = queue.enqueue(TxnKind::RemoveBlockEntity {
                        entity: existing,
                        snapshot,
                    });
                    if let Some(txn) = queue.get_mut(id) {
                        txn.mark_pre_change_applied();
                    }
                }
            }
        }
        removed
    }

    /// Announce to all six face-adjacent cells that the block at `position`
    /// changed, honoring the current capture policy.
    pub fn update_neighbors(&mut self, world: &mut dyn World, position: Position) {
        let source_state = self.view(world).state(position);
        for adjacent in position.adjacent() {
            self.capture_notification(world, adjacent, source_state.clone(), position);
        }
    }

    /// The effective capture policy for one proposed change.
    fn policy(&self, position: Position, new_state: &BlockState, flags: ChangeFlags) -> CapturePolicy {
        match self.phases.current() {
            Some(ctx) => ctx.capture_policy(position, new_state, flags),
            None => CapturePolicy::Direct,
        }
    }

    /// Whether an entity operation at `position` folds into the chain's tail.
    fn folds_into_tail(queue: &TransactionQueue, position: Position) -> bool {
        queue.tail().is_some_and(|tail| {
            tail.position() == position
                && matches!(tail.kind(), TxnKind::ChangeBlockState { .. })
        })
    }

    /// Write-through capture of a state change: apply to storage now, record
    /// the undo, defer the reactions.
    fn capture_change(
        &mut self,
        world: &mut dyn World,
        position: Position,
        new_state: BlockState,
        flags: ChangeFlags,
    ) -> BlockState {
        let snapshot = self.view(world).snapshot(position);
        let was_empty = world.section_is_empty(position);
        let replaced = self
            .view(world)
            .proceed(position, new_state.clone(), flags);
        let now_empty = world.section_is_empty(position);

        let kind_changed = !snapshot.state.same_kind(&new_state);
        let physics = flags.contains(ChangeFlags::PERFORM_BLOCK_PHYSICS);
        let kind = TxnKind::ChangeBlockState {
            snapshot,
            new_state,
            flags,
            queued_removal: None,
            queued_addition: None,
            kind_changed,
            run_add_logic: kind_changed && physics,
            suppress_break_logic: !physics
                || flags.contains(ChangeFlags::PERFORM_BLOCK_DESTRUCTION),
            emptiness_change: (was_empty != now_empty).then_some(now_empty),
        };
        if let Some(ctx) = self.phases.current_mut() {
            let queue = ctx.queue_mut();
            let id = queue.enqueue(kind);
            if let Some(txn) = queue.get_mut(id) {
                txn.mark_pre_change_applied();
            }
        }
        replaced
    }

    /// Direct application: write, then run the reactions on the spot (unless a
    /// restoring phase is current).
    fn apply_direct(
        &mut self,
        world: &mut dyn World,
        position: Position,
        new_state: &BlockState,
        flags: ChangeFlags,
    ) -> BlockState {
        let old = self.view(world).snapshot(position);
        let was_empty = world.section_is_empty(position);
        let replaced = self
            .view(world)
            .proceed(position, new_state.clone(), flags);
        let now_empty = world.section_is_empty(position);

        let restoring = self
            .phases
            .current()
            .is_some_and(|ctx| ctx.phase().is_restoring());
        if !restoring {
            let emptiness_change = (was_empty != now_empty).then_some(now_empty);
            self.run_pipeline(world, &old, new_state, flags, emptiness_change);
            self.schedule_neighbor_physics(world, position, new_state, flags);
        }
        replaced
    }

    /// Route one neighbor notification through the capture policy.
    fn capture_notification(
        &mut self,
        world: &mut dyn World,
        notify_position: Position,
        source_state: BlockState,
        source_position: Position,
    ) {
        let notify_state = self.view(world).state(notify_position);
        match self.policy(notify_position, &notify_state, ChangeFlags::UPDATE_NEIGHBORS) {
            CapturePolicy::Capture => {
                if let Some(ctx) = self.phases.current_mut() {
                    ctx.queue_mut().enqueue(TxnKind::NeighborNotification {
                        notify_position,
                        notify_state,
                        source_state,
                        source_position,
                    });
                }
            }
            CapturePolicy::Direct => {
                world.neighbor_changed(
                    self,
                    notify_position,
                    &notify_state,
                    &source_state,
                    source_position,
                );
            }
        }
    }

    /// Process the live chain at depth 0, then drain whatever the processing
    /// captured. Returns (committed, nested) counts.
    fn run_chain(
        &mut self,
        queue: &mut TransactionQueue,
        live: &[TxnId],
        world: &mut dyn World,
    ) -> Result<(usize, usize), JournalError> {
        let mut committed = 0;
        let mut nested = 0;
        for &id in live {
            if queue.get(id).is_some_and(|txn| !txn.cancelled()) {
                nested += self.process(queue, id, world, 0)?;
                committed += 1;
            }
        }
        nested += self.drain_nested(world, 1)?;
        Ok((committed, nested))
    }

    /// Process every transaction captured under the current context, repeating
    /// until no further captures arrive. Returns the number drained.
    fn drain_nested(&mut self, world: &mut dyn World, depth: usize) -> Result<usize, JournalError> {
        let mut drained = 0;
        loop {
            let mut queue = match self.phases.current_mut() {
                Some(ctx) if !ctx.queue().is_empty() => ctx.take_queue(),
                _ => return Ok(drained),
            };
            for id in queue.live_ids() {
                drained += 1 + self.process(&mut queue, id, world, depth)?;
            }
        }
    }

    /// Commit one transaction: re-apply its write, run its variant hooks,
    /// drain what they captured, then run the side-effect pipeline and
    /// schedule neighbor physics. Returns the number of nested transactions
    /// drained.
    fn process(
        &mut self,
        queue: &mut TransactionQueue,
        id: TxnId,
        world: &mut dyn World,
        depth: usize,
    ) -> Result<usize, JournalError> {
        if depth >= self.config.max_depth {
            return Err(self.depth_abort(queue, depth));
        }
        let Some(txn) = queue.get(id) else {
            return Ok(0);
        };
        if txn.cancelled() {
            return Ok(0);
        }
        trace!("processing txn #{} {} at depth {depth}", id.index(), txn.kind_name());
        let kind = txn.kind().clone();
        let mut nested = 0;

        match kind {
            TxnKind::ChangeBlockState {
                snapshot,
                new_state,
                flags,
                queued_removal,
                queued_addition,
                kind_changed,
                run_add_logic,
                suppress_break_logic,
                emptiness_change,
            } => {
                self.overlays.push(id);
                {
                    let mut proxy = self.view(world);
                    if queued_removal.is_some() {
                        proxy.queue_removal(snapshot.position)?;
                    }
                    if let Some(entity) = &queued_addition {
                        proxy.queue_addition(snapshot.position, entity.clone())?;
                    }
                    proxy.proceed(snapshot.position, new_state.clone(), flags);
                }

                if kind_changed && !suppress_break_logic {
                    world.break_block(self, snapshot.position, &snapshot.state);
                }
                if queued_removal.is_some() {
                    self.view(world).proceed_with_removal(snapshot.position);
                }
                if run_add_logic {
                    world.block_added(self, snapshot.position, &new_state);
                }
                if let Some(entity) = queued_addition {
                    self.view(world).proceed_with_add(snapshot.position, entity);
                }

                // Cause before effect: what the hooks captured commits before
                // this change's own side effects become observable. The overlay
                // must come off even when the drain aborts, or every frame on
                // the stack leaks one level.
                let drained = self.drain_nested(world, depth + 1);
                self.overlays.pop(id)?;
                nested += drained?;

                self.run_pipeline(world, &snapshot, &new_state, flags, emptiness_change);
                self.schedule_neighbor_physics(world, snapshot.position, &new_state, flags);
                nested += self.drain_nested(world, depth + 1)?;
            }

            TxnKind::AddBlockEntity { entity, snapshot } => {
                self.overlays.push(id);
                {
                    let mut proxy = self.view(world);
                    proxy.queue_addition(snapshot.position, entity.clone())?;
                    proxy.proceed_with_add(snapshot.position, entity);
                }
                self.overlays.pop(id)?;
            }

            TxnKind::RemoveBlockEntity { snapshot, .. } => {
                self.overlays.push(id);
                {
                    let mut proxy = self.view(world);
                    proxy.queue_removal(snapshot.position)?;
                    proxy.proceed_with_removal(snapshot.position);
                }
                self.overlays.pop(id)?;
            }

            TxnKind::ReplaceBlockEntity {
                added, snapshot, ..
            } => {
                self.overlays.push(id);
                {
                    let mut proxy = self.view(world);
                    proxy.queue_replacement(snapshot.position, added.clone())?;
                    proxy.proceed_with_replacement(snapshot.position, added);
                }
                self.overlays.pop(id)?;
            }

            TxnKind::NeighborNotification {
                notify_position,
                notify_state,
                source_state,
                source_position,
            } => {
                // Notifications stage nothing, so they need no overlay.
                let (source_position, source_state) = match self
                    .phases
                    .current()
                    .and_then(PhaseContext::notification_source)
                {
                    Some((position, state)) => (*position, state.clone()),
                    None => (source_position, source_state),
                };
                world.neighbor_changed(
                    self,
                    notify_position,
                    &notify_state,
                    &source_state,
                    source_position,
                );
                nested += self.drain_nested(world, depth + 1)?;
            }
        }
        Ok(nested)
    }

    /// Cancel one transaction: unwind its overlay if it left one live, restore
    /// its snapshot under the restore phase, and excise it from the chain.
    fn cancel(
        &mut self,
        queue: &mut TransactionQueue,
        id: TxnId,
        world: &mut dyn World,
    ) -> Result<(), JournalError> {
        let Some(txn) = queue.get(id) else {
            return Ok(());
        };
        if txn.cancelled() {
            return Ok(());
        }
        trace!("cancelling txn #{} {}", id.index(), txn.kind_name());

        if self.overlays.top_owner() == Some(id) {
            self.overlays.pop(id)?;
        }

        let restore = txn
            .pre_change_applied()
            .then(|| txn.kind().snapshot().cloned())
            .flatten();
        if let Some(snapshot) = restore {
            self.phases
                .push(PhaseContext::new(Restore).without_bulk_captures());
            self.view(world)
                .proceed(snapshot.position, snapshot.state.clone(), ChangeFlags::empty());
            if world.block_entity(snapshot.position) != snapshot.entity {
                match snapshot.entity {
                    Some(entity) => world.add_block_entity(snapshot.position, entity),
                    None => {
                        world.remove_block_entity(snapshot.position);
                    }
                }
            }
            self.phases.pop();
        }
        queue.excise(id);
        Ok(())
    }

    /// Run the side-effect pipeline for one committed state change.
    fn run_pipeline(
        &mut self,
        world: &mut dyn World,
        old: &Snapshot,
        new_state: &BlockState,
        flags: ChangeFlags,
        emptiness_change: Option<bool>,
    ) {
        let explosion = self
            .phases
            .current()
            .is_some_and(|ctx| ctx.phase().is_explosion());
        let limit = self.config.shape_update_limit;
        let pipeline = self.pipeline.clone();
        let mut ctx = EffectCtx {
            journal: self,
            world,
            position: old.position,
            old,
            new_state,
            flags,
            emptiness_change,
            limit,
            explosion,
        };
        pipeline.run(&mut ctx);
    }

    /// Schedule one neighbor notification per adjacent cell, when the flags
    /// ask for neighbor physics.
    fn schedule_neighbor_physics(
        &mut self,
        world: &mut dyn World,
        position: Position,
        new_state: &BlockState,
        flags: ChangeFlags,
    ) {
        if flags.contains(ChangeFlags::UPDATE_NEIGHBORS) {
            for adjacent in position.adjacent() {
                self.capture_notification(world, adjacent, new_state.clone(), position);
            }
        }
    }

    /// Build the depth-ceiling error, logging it once per phase name (or
    /// every time under verbose diagnostics).
    fn depth_abort(&mut self, queue: &TransactionQueue, depth: usize) -> JournalError {
        let phase = match self.phases.current() {
            Some(ctx) => ctx.phase().name(),
            None => arcstr::literal!("(no phase)"),
        };
        let report = queue.report();
        if self.config.verbose_diagnostics || self.depth_reported.insert(phase.clone()) {
            error!("transaction processing exceeded depth {depth} in phase {phase}\n{report}");
        }
        JournalError::DepthLimit {
            depth,
            phase,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::VACANT;
    use crate::testing::{allow_all, veto_all, CapturingPhase, DirectPhase, Hook, RecordingWorld};
    use crate::world::MemoryWorld;
    use pretty_assertions::assert_eq;
    use rand::{Rng as _, SeedableRng as _};
    use rand_xoshiro::Xoshiro256Plus;

    fn capture_context() -> PhaseContext {
        PhaseContext::new(CapturingPhase::new("plugin"))
    }

    #[test]
    fn direct_write_applies_and_reacts_immediately() {
        let mut journal = Journal::new();
        let mut world = RecordingWorld::new();
        let p = Position::new(1, 0, 0);

        let replaced = journal.set_block(&mut world, p, BlockState::new("stone"), ChangeFlags::DEFAULT);
        assert_eq!(replaced, VACANT);
        assert_eq!(world.state(p), BlockState::new("stone"));
        assert!(world.hooks().contains(&Hook::NotifyChanged {
            position: p,
            flags: ChangeFlags::DEFAULT,
        }));
        // Neighbor physics ran immediately, once per adjacent cell.
        let neighbors: Vec<_> = world
            .hooks()
            .iter()
            .filter(|hook| matches!(hook, Hook::NeighborChanged { source, .. } if *source == p))
            .collect();
        assert_eq!(neighbors.len(), 6);
        assert!(journal.overlays().is_empty());
    }

    #[test]
    fn capture_writes_through_but_defers_reactions() {
        let mut journal = Journal::new();
        let mut world = RecordingWorld::new();
        let p = Position::new(0, 1, 0);
        world.set_state(p, BlockState::new("stone"), ChangeFlags::DEFAULT);

        journal.enter(capture_context());
        let before = world.state(p);
        let replaced = journal.set_block(&mut world, p, BlockState::new("dirt"), ChangeFlags::DEFAULT);
        assert_eq!(replaced, before);
        // The write is already authoritative...
        assert_eq!(world.state(p), BlockState::new("dirt"));
        // ...but no reaction has run yet.
        assert_eq!(world.hooks(), &[]);

        let stats = journal.complete(&mut world, &mut allow_all()).unwrap();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.vetoed, 0);
        assert_eq!(world.state(p), BlockState::new("dirt"));
        assert!(world.hooks().contains(&Hook::NotifyChanged {
            position: p,
            flags: ChangeFlags::DEFAULT,
        }));
        assert!(journal.overlays().is_empty());
        assert!(journal.phases().is_empty());
    }

    #[test]
    fn veto_restores_the_pre_enqueue_state() {
        let mut journal = Journal::new();
        let mut world = RecordingWorld::new();
        let p = Position::new(2, 0, 0);
        let chest = BlockEntity::new("chest");
        world.set_state(p, BlockState::new("chest"), ChangeFlags::DEFAULT);
        world.add_block_entity(p, chest.clone());
        world.clear_hooks();

        journal.enter(capture_context());
        journal.set_block(&mut world, p, BlockState::new("stone"), ChangeFlags::DEFAULT);
        // The removal folds into the pending change, so one proposal covers both.
        journal.remove_block_entity(&mut world, p);
        let stats = journal.complete(&mut world, &mut veto_all()).unwrap();

        assert_eq!(stats.committed, 0);
        assert_eq!(stats.vetoed, 1);
        assert_eq!(journal.view(&mut world).state(p), BlockState::new("chest"));
        assert_eq!(world.block_entity(p), Some(chest));
        // Rollback is quiet: no pipeline, no neighbor physics.
        let reactions: Vec<_> = world
            .hooks()
            .iter()
            .filter(|hook| !matches!(hook, Hook::PreDetach(_)))
            .collect();
        assert_eq!(reactions, Vec::<&Hook>::new());
    }

    #[test]
    fn disjoint_captured_changes_match_direct_application() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x6a6f75726e616c);
        let palette = ["stone", "dirt", "sand", "clay", "vacant"];

        let mut positions = HashSet::new();
        while positions.len() < 32 {
            positions.insert(Position::new(
                rng.random_range(-20..20),
                rng.random_range(-20..20),
                rng.random_range(-20..20),
            ));
        }
        let writes: Vec<(Position, BlockState)> = positions
            .into_iter()
            .map(|p| {
                let kind = palette[rng.random_range(0..palette.len())];
                (p, BlockState::new(kind))
            })
            .collect();

        let mut journal = Journal::new();
        let mut captured = MemoryWorld::new();
        journal.enter(capture_context());
        for (position, state) in &writes {
            journal.set_block(&mut captured, *position, state.clone(), ChangeFlags::DEFAULT);
        }
        journal.complete(&mut captured, &mut allow_all()).unwrap();

        let mut direct = MemoryWorld::new();
        for (position, state) in &writes {
            direct.set_state(*position, state.clone(), ChangeFlags::DEFAULT);
        }

        assert_eq!(captured, direct);
    }

    #[test]
    fn round_trip_snapshot_matches_pre_enqueue_read() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let p = Position::new(3, 3, 3);
        world.set_state(p, BlockState::new("stone"), ChangeFlags::DEFAULT);

        journal.enter(capture_context());
        let observed = journal.view(&mut world).state(p);
        journal.set_block(&mut world, p, BlockState::new("dirt"), ChangeFlags::DEFAULT);

        let recorded = journal
            .phases()
            .current()
            .and_then(|ctx| ctx.queue().tail())
            .map(|txn| txn.original().clone());
        assert_eq!(recorded, Some(observed));

        journal.complete(&mut world, &mut allow_all()).unwrap();
        assert_eq!(world.state(p), BlockState::new("dirt"));
    }

    /// World whose break logic plants a marker block, for asserting that
    /// nested commits land before the outer change's own side effects.
    #[derive(Debug)]
    struct CascadeWorld {
        inner: MemoryWorld,
        trigger: Position,
        planted: Position,
        order: Vec<String>,
    }

    impl Default for CascadeWorld {
        fn default() -> Self {
            CascadeWorld {
                inner: MemoryWorld::new(),
                trigger: Position::ORIGIN,
                planted: Position::ORIGIN,
                order: Vec::new(),
            }
        }
    }

    impl World for CascadeWorld {
        fn state(&self, position: Position) -> BlockState {
            self.inner.state(position)
        }
        fn set_state(
            &mut self,
            position: Position,
            state: BlockState,
            flags: ChangeFlags,
        ) -> BlockState {
            self.order.push(format!("write {position:?} {state:?}"));
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
        fn break_block(&mut self, journal: &mut Journal, position: Position, _old: &BlockState) {
            self.order.push(format!("break {position:?}"));
            if position == self.trigger {
                let planted = self.planted;
                journal.set_block(self, planted, BlockState::new("seed"), ChangeFlags::empty());
            }
        }
        fn notify_changed(
            &mut self,
            position: Position,
            _old: &BlockState,
            _new: &BlockState,
            _flags: ChangeFlags,
        ) {
            self.order.push(format!("notify {position:?}"));
        }
    }

    #[test]
    fn nested_transactions_commit_before_outer_side_effects() {
        let trigger = Position::new(0, 0, 0);
        let planted = Position::new(9, 0, 0);
        let mut world = CascadeWorld {
            trigger,
            planted,
            ..CascadeWorld::default()
        };
        world.inner.set_state(trigger, BlockState::new("stone"), ChangeFlags::DEFAULT);

        let mut journal = Journal::new();
        journal.enter(capture_context());
        journal.set_block(&mut world, trigger, VACANT, ChangeFlags::DEFAULT);
        let stats = journal.complete(&mut world, &mut allow_all()).unwrap();

        assert_eq!(world.state(planted), BlockState::new("seed"));
        assert!(stats.nested >= 1, "the planted change must count as nested");

        let index_of = |needle: &str| {
            world
                .order
                .iter()
                .position(|entry| entry.starts_with(needle))
                .unwrap_or_else(|| panic!("missing {needle:?} in {:?}", world.order))
        };
        let broke = index_of("break (0, 0, 0)");
        let planted_write = index_of("write (9, 0, 0) seed");
        let outer_notify = index_of("notify (0, 0, 0)");
        assert!(broke < planted_write, "break logic plants the seed");
        assert!(
            planted_write < outer_notify,
            "nested commit must precede the outer notification: {:?}",
            world.order
        );
    }

    /// World whose on-add logic immediately replaces the block again, forever.
    #[derive(Debug, Default)]
    struct LoopWorld {
        inner: MemoryWorld,
        toggles: usize,
    }

    impl World for LoopWorld {
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
        fn block_added(&mut self, journal: &mut Journal, position: Position, _new: &BlockState) {
            self.toggles += 1;
            let kind = if self.toggles % 2 == 0 { "ping" } else { "pong" };
            journal.set_block(self, position, BlockState::new(kind), ChangeFlags::DEFAULT);
        }
    }

    #[test]
    fn feedback_loop_aborts_at_the_depth_ceiling() {
        let mut world = LoopWorld::default();
        let mut journal = Journal::new().with_config(Config {
            max_depth: 6,
            ..Config::default()
        });

        journal.enter(capture_context());
        journal.set_block(
            &mut world,
            Position::ORIGIN,
            BlockState::new("ping"),
            ChangeFlags::DEFAULT,
        );
        let error = journal
            .complete(&mut world, &mut allow_all())
            .expect_err("the loop must hit the ceiling");

        match error {
            JournalError::DepthLimit { depth, phase, report } => {
                assert_eq!(depth, 6);
                assert!(phase.starts_with("unwind("), "aborted in {phase}");
                assert!(report.recorded() >= 1);
            }
            other => panic!("expected a depth-limit error, got {other:?}"),
        }
    }

    #[test]
    fn depth_abort_leaves_no_overlay_behind() {
        let mut world = LoopWorld::default();
        let mut journal = Journal::new().with_config(Config {
            max_depth: 6,
            ..Config::default()
        });

        journal.enter(capture_context());
        journal.set_block(
            &mut world,
            Position::ORIGIN,
            BlockState::new("ping"),
            ChangeFlags::DEFAULT,
        );
        journal
            .complete(&mut world, &mut allow_all())
            .expect_err("the loop must hit the ceiling");

        // Every frame on the aborted stack must have unwound its overlay, or
        // later reads through the view would see stale provisional state.
        assert!(journal.overlays().is_empty());
        let viewed = journal.view(&mut world).state(Position::ORIGIN);
        assert_eq!(viewed, world.inner.state(Position::ORIGIN));
    }

    #[test]
    fn same_position_stack_unwinds_in_reverse_on_partial_veto() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let p = Position::ORIGIN;

        journal.enter(capture_context());
        journal.set_block(&mut world, p, BlockState::new("stone"), ChangeFlags::DEFAULT);
        journal.set_block(&mut world, p, BlockState::new("dirt"), ChangeFlags::DEFAULT);
        journal.set_block(&mut world, p, BlockState::new("sand"), ChangeFlags::DEFAULT);

        let mut pairs = Vec::new();
        let mut bus = |proposals: &[Proposal]| {
            for proposal in proposals {
                pairs.push((
                    proposal.pair.before.state.clone(),
                    proposal.pair.after.state.clone(),
                ));
            }
            // Veto only the middle change.
            proposals
                .iter()
                .enumerate()
                .map(|(i, _)| if i == 1 { Verdict::Veto } else { Verdict::Allow })
                .collect()
        };
        let stats = journal.complete(&mut world, &mut bus).unwrap();

        assert_eq!(stats.committed, 2);
        assert_eq!(stats.vetoed, 1);
        assert_eq!(
            pairs,
            vec![
                (VACANT, BlockState::new("stone")),
                (BlockState::new("stone"), BlockState::new("dirt")),
                (BlockState::new("dirt"), BlockState::new("sand")),
            ]
        );
        // Survivors replay in order; the final state is the last survivor's.
        assert_eq!(world.state(p), BlockState::new("sand"));
    }

    #[test]
    fn full_veto_of_a_same_position_stack_restores_the_original() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let p = Position::ORIGIN;

        journal.enter(capture_context());
        journal.set_block(&mut world, p, BlockState::new("stone"), ChangeFlags::DEFAULT);
        journal.set_block(&mut world, p, BlockState::new("dirt"), ChangeFlags::DEFAULT);
        journal.set_block(&mut world, p, BlockState::new("sand"), ChangeFlags::DEFAULT);
        let stats = journal.complete(&mut world, &mut veto_all()).unwrap();

        assert_eq!(stats.vetoed, 3);
        assert_eq!(world.state(p), VACANT);
    }

    #[test]
    fn veto_by_position_cancels_only_matching_changes() {
        use crate::testing::{make_states, veto_at};

        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let [stone, dirt] = make_states(["stone", "dirt"]);
        let a = Position::new(0, 0, 0);
        let b = Position::new(1, 0, 0);

        journal.enter(capture_context());
        journal.set_block(&mut world, a, stone, ChangeFlags::DEFAULT);
        journal.set_block(&mut world, b, dirt.clone(), ChangeFlags::DEFAULT);
        let stats = journal.complete(&mut world, &mut veto_at([a])).unwrap();

        assert_eq!(stats.committed, 1);
        assert_eq!(stats.vetoed, 1);
        assert_eq!(world.state(a), VACANT);
        assert_eq!(world.state(b), dirt);
    }

    #[test]
    fn entity_operations_fold_into_a_pending_change() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let p = Position::new(4, 0, 0);
        let chest = BlockEntity::new("chest");

        journal.enter(capture_context());
        journal.set_block(&mut world, p, BlockState::new("chest"), ChangeFlags::DEFAULT);
        journal.add_block_entity(&mut world, p, chest.clone());

        let mut proposal_count = 0;
        let mut after_entity = None;
        let mut bus = |proposals: &[Proposal]| {
            proposal_count = proposals.len();
            after_entity = proposals[0].pair.after.entity.clone();
            vec![Verdict::Allow; proposals.len()]
        };
        let stats = journal.complete(&mut world, &mut bus).unwrap();

        assert_eq!(proposal_count, 1, "the entity add folds, not a second node");
        assert_eq!(after_entity, Some(chest.clone()));
        assert_eq!(stats.committed, 1);
        assert_eq!(world.block_entity(p), Some(chest));
    }

    #[test]
    fn folded_add_then_remove_cancels_itself_out() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let p = Position::new(5, 0, 0);

        journal.enter(capture_context());
        journal.set_block(&mut world, p, BlockState::new("chest"), ChangeFlags::DEFAULT);
        journal.add_block_entity(&mut world, p, BlockEntity::new("chest"));
        journal.remove_block_entity(&mut world, p);

        let mut after_entity = Some(BlockEntity::new("sentinel"));
        let mut bus = |proposals: &[Proposal]| {
            after_entity = proposals[0].pair.after.entity.clone();
            vec![Verdict::Allow; proposals.len()]
        };
        journal.complete(&mut world, &mut bus).unwrap();
        assert_eq!(after_entity, None);
        assert_eq!(world.block_entity(p), None);
    }

    #[test]
    fn binding_over_an_existing_entity_records_a_replacement() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let p = Position::new(6, 0, 0);
        let chest = BlockEntity::new("chest");
        let barrel = BlockEntity::new("barrel");
        world.set_state(p, BlockState::new("chest"), ChangeFlags::DEFAULT);
        world.add_block_entity(p, chest.clone());

        journal.enter(capture_context());
        let displaced = journal.add_block_entity(&mut world, p, barrel.clone());
        assert_eq!(displaced, Some(chest.clone()));
        assert_eq!(world.block_entity(p), Some(barrel), "write-through applies now");
        assert!(matches!(
            journal
                .phases()
                .current()
                .and_then(|ctx| ctx.queue().tail())
                .map(crate::transaction::Transaction::kind),
            Some(TxnKind::ReplaceBlockEntity { .. })
        ));

        // Veto puts the chest back.
        journal.complete(&mut world, &mut veto_all()).unwrap();
        assert_eq!(world.block_entity(p), Some(chest));
    }

    #[test]
    fn removing_an_unbound_entity_records_nothing() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();

        journal.enter(capture_context());
        assert_eq!(journal.remove_block_entity(&mut world, Position::ORIGIN), None);
        assert!(journal
            .phases()
            .current()
            .is_some_and(|ctx| ctx.queue().is_empty()));
        let stats = journal.complete(&mut world, &mut allow_all()).unwrap();
        assert_eq!(stats, FlushStats::default());
    }

    #[test]
    fn flush_without_a_cause_warns_and_attributes_unknown() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();

        journal.enter(capture_context());
        journal.set_block(&mut world, Position::ORIGIN, BlockState::new("stone"), ChangeFlags::DEFAULT);
        let mut seen = None;
        let mut bus = |proposals: &[Proposal]| {
            seen = Some(proposals[0].cause.clone());
            vec![Verdict::Allow; proposals.len()]
        };
        journal.complete(&mut world, &mut bus).unwrap();
        assert_eq!(seen, Some(Cause::unknown()));
    }

    #[test]
    fn proposals_carry_the_context_source_or_the_cause_frame() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        let mut seen = Vec::new();

        // A cause frame pushed by the host.
        journal.with_cause(Cause::new("player:alice"), |journal| {
            journal.enter(capture_context());
            journal.set_block(&mut world, Position::ORIGIN, BlockState::new("stone"), ChangeFlags::DEFAULT);
            let mut bus = |proposals: &[Proposal]| {
                seen.push(proposals[0].cause.clone());
                vec![Verdict::Allow; proposals.len()]
            };
            journal.complete(&mut world, &mut bus).unwrap();
        });

        // An explicit context source wins over the frame.
        journal.with_cause(Cause::new("player:alice"), |journal| {
            journal.enter(capture_context().with_source(Cause::new("piston")));
            journal.set_block(&mut world, Position::ORIGIN, BlockState::new("dirt"), ChangeFlags::DEFAULT);
            let mut bus = |proposals: &[Proposal]| {
                seen.push(proposals[0].cause.clone());
                vec![Verdict::Allow; proposals.len()]
            };
            journal.complete(&mut world, &mut bus).unwrap();
        });

        assert_eq!(seen, vec![Cause::new("player:alice"), Cause::new("piston")]);
        assert!(journal.causes().is_empty());
    }

    #[test]
    fn notification_source_override_rewrites_the_reported_source() {
        let mut journal = Journal::new();
        let mut world = RecordingWorld::new();
        let p = Position::new(0, 5, 0);
        let broken = Position::new(8, 8, 8);

        journal.enter(
            PhaseContext::new(CapturingPhase::new("break-path"))
                .with_notification_source(broken, BlockState::new("stone")),
        );
        journal.set_block(&mut world, p, BlockState::new("dirt"), ChangeFlags::DEFAULT);
        journal.complete(&mut world, &mut allow_all()).unwrap();

        let sources: Vec<Position> = world
            .hooks()
            .iter()
            .filter_map(|hook| match hook {
                Hook::NeighborChanged { source, .. } => Some(*source),
                _ => None,
            })
            .collect();
        assert_eq!(sources.len(), 6);
        assert!(sources.iter().all(|&source| source == broken));
    }

    #[test]
    fn captured_neighbor_updates_flow_through_the_queue() {
        let mut journal = Journal::new();
        let mut world = RecordingWorld::new();
        let p = Position::new(7, 7, 7);
        world.set_state(p, BlockState::new("stone"), ChangeFlags::DEFAULT);
        world.clear_hooks();

        journal.enter(capture_context());
        journal.update_neighbors(&mut world, p);
        assert_eq!(world.hooks(), &[], "captured notifications defer");
        assert_eq!(
            journal.phases().current().map(|ctx| ctx.queue().len()),
            Some(6)
        );

        let stats = journal.complete(&mut world, &mut allow_all()).unwrap();
        assert_eq!(stats.committed, 6);
        let notified: Vec<Position> = world
            .hooks()
            .iter()
            .filter_map(|hook| match hook {
                Hook::NeighborChanged { position, source } if *source == p => Some(*position),
                _ => None,
            })
            .collect();
        assert_eq!(notified.len(), 6);
    }

    #[test]
    fn direct_phase_and_bulk_capture_off_bypass_the_bus() {
        for context in [
            PhaseContext::new(DirectPhase::new("tick")),
            PhaseContext::new(CapturingPhase::new("plugin")).without_bulk_captures(),
        ] {
            let mut journal = Journal::new();
            let mut world = RecordingWorld::new();
            let p = Position::new(0, 0, 9);

            journal.enter(context);
            journal.set_block(&mut world, p, BlockState::new("stone"), ChangeFlags::DEFAULT);
            // Reactions already ran; nothing was captured.
            assert!(world.hooks().contains(&Hook::NotifyChanged {
                position: p,
                flags: ChangeFlags::DEFAULT,
            }));

            let mut bus = |_: &[Proposal]| -> Vec<Verdict> {
                panic!("the bus must not be consulted for direct writes")
            };
            let stats = journal.complete(&mut world, &mut bus).unwrap();
            assert_eq!(stats, FlushStats::default());
        }
    }

    #[test]
    fn restoring_phase_suppresses_the_pipeline() {
        let mut journal = Journal::new();
        let mut world = RecordingWorld::new();
        let p = Position::new(1, 1, 1);

        journal.enter(PhaseContext::new(Restore));
        journal.set_block(&mut world, p, BlockState::new("stone"), ChangeFlags::DEFAULT);
        assert_eq!(world.state(p), BlockState::new("stone"));
        assert_eq!(world.hooks(), &[], "restores are quiet");
        let stats = journal.complete(&mut world, &mut allow_all()).unwrap();
        assert_eq!(stats, FlushStats::default());
    }

    #[test]
    fn quiet_change_skips_light_and_shape_steps() {
        let mut journal = Journal::new();
        let mut world = RecordingWorld::new();
        let p = Position::new(2, 2, 2);
        world.set_state(p, BlockState::new("stone"), ChangeFlags::DEFAULT);
        world.clear_hooks();

        journal.enter(capture_context());
        // Same light properties, no flags: nothing to propagate.
        journal.set_block(&mut world, p, BlockState::new("dirt"), ChangeFlags::empty());
        journal.complete(&mut world, &mut allow_all()).unwrap();

        assert!(!world
            .hooks()
            .iter()
            .any(|hook| matches!(hook, Hook::CheckLight(_) | Hook::ShapeUpdates { .. })));
    }

    #[test]
    fn completing_without_a_context_is_an_error() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();
        assert_eq!(
            journal.complete(&mut world, &mut allow_all()),
            Err(JournalError::NoContext)
        );
    }

    #[test]
    fn verdict_count_mismatch_is_an_invariant_violation() {
        let mut journal = Journal::new();
        let mut world = MemoryWorld::new();

        journal.enter(capture_context());
        journal.set_block(&mut world, Position::ORIGIN, BlockState::new("stone"), ChangeFlags::DEFAULT);
        let mut bus = |_: &[Proposal]| Vec::new();
        assert_eq!(
            journal.complete(&mut world, &mut bus),
            Err(JournalError::VerdictCount {
                expected: 1,
                returned: 0,
            })
        );
    }

    #[test]
    fn error_text_and_sources() {
        let mismatch = JournalError::VerdictCount {
            expected: 3,
            returned: 1,
        };
        assert_eq!(
            mismatch.to_string(),
            "event bus returned 1 verdicts for 3 proposals"
        );
        assert!(core::error::Error::source(&mismatch).is_none());

        let wrapped = JournalError::Overlay(OverlayError::NoOverlay);
        assert_eq!(wrapped.to_string(), "entity operation staged with no overlay live");
        assert!(core::error::Error::source(&wrapped).is_some());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{ "max_depth": 8 }"#).unwrap();
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.shape_update_limit, Config::default().shape_update_limit);
        assert!(!config.verbose_diagnostics);
    }
}
