//! The side-effect pipeline run when a block-state change commits.
//!
//! Steps are plain named function values in an ordered list chosen at build
//! time; [`Pipeline::standard`] is the canonical order for a normal change.
//! Any step may short-circuit the rest by returning [`EffectResult::Done`].

use core::fmt;

use log::trace;

use crate::block::{BlockState, Snapshot};
use crate::flags::ChangeFlags;
use crate::journal::Journal;
use crate::math::Position;
use crate::world::World;

/// Outcome of one pipeline step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum EffectResult {
    /// Continue with the next step.
    Pass,
    /// Nothing further to propagate; skip the remaining steps.
    Done,
}

/// Everything a pipeline step may consult or act on.
///
/// Steps receive the engine handle so re-entrant host reactions (shape
/// updates, explosion logic) can capture nested transactions.
#[non_exhaustive]
pub struct EffectCtx<'a> {
    /// Engine handle, for reactions that cascade into further mutations.
    pub journal: &'a mut Journal,
    /// Authoritative storage and host reactions.
    pub world: &'a mut dyn World,
    /// The cell the committing transaction changed.
    pub position: Position,
    /// Pre-change capture of that cell.
    pub old: &'a Snapshot,
    /// The state the transaction committed.
    pub new_state: &'a BlockState,
    /// Reaction flags of the change.
    pub flags: ChangeFlags,
    /// Whether the write flipped the containing section's emptiness, and if
    /// so what the emptiness became.
    pub emptiness_change: Option<bool>,
    /// Remaining shape-update propagation budget.
    pub limit: u32,
    /// Whether the commit is happening under an explosion phase.
    pub explosion: bool,
}

impl fmt::Debug for EffectCtx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectCtx")
            .field("position", &self.position)
            .field("flags", &self.flags)
            .field("limit", &self.limit)
            .field("explosion", &self.explosion)
            .finish_non_exhaustive()
    }
}

/// One named side-effect step.
#[derive(Clone, Copy)]
pub struct Step {
    name: &'static str,
    f: fn(&mut EffectCtx<'_>) -> EffectResult,
}

impl Step {
    /// Construct a named step from a function.
    pub const fn new(name: &'static str, f: fn(&mut EffectCtx<'_>) -> EffectResult) -> Self {
        Self { name, f }
    }

    /// Diagnostic name of the step.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step({})", self.name)
    }
}

/// An ordered, short-circuitable list of side-effect [`Step`]s.
///
/// The engine runs the pipeline once per committing block-state change, after
/// nested transactions have drained. Steps never re-enter the pipeline; a
/// reaction that mutates the world does so through new transactions.
#[derive(Clone, Debug)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// A pipeline that performs no side effects.
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// The canonical step order for a normal block change.
    pub fn standard() -> Self {
        Self {
            steps: vec![
                Step::new("superseded_guard", superseded_guard),
                Step::new("detach_replaced_entity", detach_replaced_entity),
                Step::new("section_emptiness", section_emptiness),
                Step::new("explosion_notice", explosion_notice),
                Step::new("shape_updates", shape_updates),
                Step::new("light_recheck", light_recheck),
                Step::new("notify_clients", notify_clients),
            ],
        }
    }

    /// Append `step` to the run order.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// The steps in run order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the steps in order until one reports [`EffectResult::Done`].
    pub fn run(&self, ctx: &mut EffectCtx<'_>) {
        for step in &self.steps {
            trace!("effect {} at {:?}", step.name, ctx.position);
            if (step.f)(ctx) == EffectResult::Done {
                trace!("effect {} stopped the pipeline", step.name);
                break;
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Stops the pipeline when authoritative state no longer equals the
/// transaction's new state, meaning a nested transaction superseded it.
pub fn superseded_guard(ctx: &mut EffectCtx<'_>) -> EffectResult {
    if ctx.world.state(ctx.position) == *ctx.new_state {
        EffectResult::Pass
    } else {
        trace!("change at {:?} was superseded; skipping side effects", ctx.position);
        EffectResult::Done
    }
}

/// Detaches a block entity left behind by a state change that replaced the
/// block it belonged to.
///
/// Runs only when the old state carried an entity, destruction is not being
/// performed, and block physics is requested.
pub fn detach_replaced_entity(ctx: &mut EffectCtx<'_>) -> EffectResult {
    let wants_detach = ctx.old.entity.is_some()
        && !ctx.flags.contains(ChangeFlags::PERFORM_BLOCK_DESTRUCTION)
        && ctx.flags.contains(ChangeFlags::PERFORM_BLOCK_PHYSICS);
    if wants_detach {
        if let Some(entity) = ctx.world.block_entity(ctx.position) {
            ctx.world.pre_detach_entity(ctx.position, &entity);
            ctx.world.remove_block_entity(ctx.position);
        }
    }
    EffectResult::Pass
}

/// Reports a section emptiness transition to the light engine.
pub fn section_emptiness(ctx: &mut EffectCtx<'_>) -> EffectResult {
    if let Some(empty) = ctx.emptiness_change {
        ctx.world.section_status_changed(ctx.position, empty);
    }
    EffectResult::Pass
}

/// Tells the host a block was destroyed by an explosion. Runs only under an
/// explosion phase.
pub fn explosion_notice(ctx: &mut EffectCtx<'_>) -> EffectResult {
    if ctx.explosion {
        let old_state = ctx.old.state.clone();
        ctx.world.explosion_destroyed(ctx.journal, ctx.position, &old_state);
    }
    EffectResult::Pass
}

/// Requests direct and diagonal shape updates for the changed block's
/// neighbors.
///
/// The flags passed down have the neighbor-update and moving-blocks bits
/// cleared, and the propagation budget is decremented; a budget of zero skips
/// the step entirely.
pub fn shape_updates(ctx: &mut EffectCtx<'_>) -> EffectResult {
    if ctx.flags.contains(ChangeFlags::NOTIFY_OBSERVERS) && ctx.limit > 0 {
        let flags = ctx.flags.without_propagation();
        let limit = ctx.limit - 1;
        let new_state = ctx.new_state.clone();
        ctx.world.shape_updates(ctx.journal, ctx.position, &new_state, flags, limit);
        ctx.world
            .diagonal_shape_updates(ctx.journal, ctx.position, &new_state, flags, limit);
    }
    EffectResult::Pass
}

/// Has the light engine re-examine the cell when old and new states differ in
/// emission or light blocking.
pub fn light_recheck(ctx: &mut EffectCtx<'_>) -> EffectResult {
    if ctx.old.state.light_differs(ctx.new_state) {
        ctx.world.check_light(ctx.position);
    }
    EffectResult::Pass
}

/// Ships the committed change to connected clients.
pub fn notify_clients(ctx: &mut EffectCtx<'_>) -> EffectResult {
    if ctx.flags.contains(ChangeFlags::NOTIFY_CLIENTS) {
        ctx.world
            .notify_changed(ctx.position, &ctx.old.state, ctx.new_state, ctx.flags);
    }
    EffectResult::Pass
}
