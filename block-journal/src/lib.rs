//! Transactional capture, veto, rollback, and replay of mutations to a
//! block-grid world.
//!
//! Games built on block grids accumulate a particular kind of complexity: a
//! single player action fans out into block physics, entity bookkeeping, light
//! recalculation, and neighbor updates, each of which may mutate further cells
//! and trigger further reactions. This crate factors that complexity into an
//! explicit engine, the [`Journal`], which records every mutation as a
//! [`Transaction`], lets an event bus veto batches of them before their side
//! effects become observable, and replays the survivors in a deterministic
//! order.
//!
//! ## Data model
//!
//! * A [`Journal`] is the engine. Hosts thread `&mut Journal` down every
//!   mutating code path; re-entrant reaction hooks receive the same handle so
//!   cascading mutations flow back through capture. It is single-threaded by
//!   design: one journal serves one world, and the borrow checker enforces
//!   the rest.
//! * A [`World`] is whatever stores the grid. The crate defines the trait
//!   (authoritative storage plus optional reaction hooks) and a
//!   [`MemoryWorld`] for tests and tools; hosts bring their own.
//! * A [`BlockState`] is the sharable, immutable description of one cell; a
//!   [`BlockEntity`] is the mutable payload some cells carry. A [`Snapshot`]
//!   is the pair as observed at one position at one instant.
//! * A [`PhaseContext`] brackets one mutating code path. While it is on the
//!   stack, its [`Phase`] decides per-write whether to capture or apply
//!   directly, and its transaction chain accumulates what was captured.
//! * An [`EventBus`] reviews the captured chain at completion as before/after
//!   [`Proposal`]s with [`Cause`] attribution, and may veto any subset.
//!   Vetoed transactions roll back to the state they observed; the rest
//!   replay together with everything they cascade into.
//! * A [`Pipeline`] of effect steps runs after each committed state change:
//!   entity detach, section emptiness tracking, shape updates, light
//!   rechecks, client notification. Hosts can rearrange or extend it.
//!
//! ## Writes are not deferred
//!
//! Capturing a change is not queueing it for later: the authoritative write
//! happens immediately, and what the journal defers is the *reactive* side.
//! Reads during a phase therefore always see current data, and a veto is an
//! explicit rollback rather than a discarded intent.
//!
//! ## Dependencies and global state
//!
//! This crate has no global state, but it writes log messages using the
//! [`log`] crate and is therefore subject to that global configuration.
//! It depends on and re-exports [`euclid`] for vector math
//! (as `block_journal::euclid`).
//!
//! [`BlockEntity`]: crate::block::BlockEntity
//! [`BlockState`]: crate::block::BlockState
//! [`Cause`]: crate::cause::Cause
//! [`EventBus`]: crate::bus::EventBus
//! [`Journal`]: crate::journal::Journal
//! [`MemoryWorld`]: crate::world::MemoryWorld
//! [`Phase`]: crate::phase::Phase
//! [`PhaseContext`]: crate::phase::PhaseContext
//! [`Pipeline`]: crate::effect::Pipeline
//! [`Proposal`]: crate::bus::Proposal
//! [`Snapshot`]: crate::block::Snapshot
//! [`Transaction`]: crate::transaction::Transaction
//! [`World`]: crate::world::World

pub mod block;
pub mod bus;
pub mod cause;
pub mod effect;
pub mod flags;
pub mod journal;
pub mod math;
pub mod phase;
pub mod proxy;
pub mod queue;
pub mod testing;
pub mod transaction;
pub mod util;
pub mod world;

/// Re-export the version of the `euclid` vector math library we're using.
pub use euclid;
