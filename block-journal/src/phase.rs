//! Phases: markers for "what kind of code is running", the capture policy
//! they impose, and the stack of [`PhaseContext`]s carrying captured work.

use core::fmt;
use core::mem;
use std::sync::Arc;

use arcstr::ArcStr;

use crate::block::BlockState;
use crate::cause::Cause;
use crate::flags::ChangeFlags;
use crate::math::Position;
use crate::queue::TransactionQueue;

/// Verdict of a [`Phase`] on one proposed change.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum CapturePolicy {
    /// Record the change as a transaction; reactions run at flush time and the
    /// event bus may veto it.
    Capture,
    /// Apply immediately with no undo record and no event.
    Direct,
}

/// A marker describing what kind of code is currently mutating the world.
///
/// Phases decide, per proposed change, whether the engine captures it for
/// veto/rollback or applies it immediately. Host phases (plugin call, world
/// tick, chunk load, explosion) implement this; the engine supplies
/// [`Restore`] and [`Unwind`].
pub trait Phase: fmt::Debug {
    /// Label used in diagnostics and depth-report deduplication.
    fn name(&self) -> ArcStr;

    /// Whether `new_state` at `position` should be captured or applied
    /// directly.
    fn capture_policy(
        &self,
        position: Position,
        new_state: &BlockState,
        flags: ChangeFlags,
    ) -> CapturePolicy;

    /// Whether this phase is undoing transactions. Restoring phases never
    /// capture, and the engine suppresses the side-effect pipeline under
    /// them.
    fn is_restoring(&self) -> bool {
        false
    }

    /// Whether this phase is processing an explosion; the explosion pipeline
    /// step runs only when it is.
    fn is_explosion(&self) -> bool {
        false
    }
}

/// Phase active while cancelled transactions are being undone.
///
/// Always applies directly, so rollback cannot itself be captured and rolled
/// back.
#[derive(Clone, Copy, Debug, Default)]
#[expect(clippy::exhaustive_structs)]
pub struct Restore;

impl Phase for Restore {
    fn name(&self) -> ArcStr {
        arcstr::literal!("restore")
    }

    fn capture_policy(
        &self,
        _: Position,
        _: &BlockState,
        _: ChangeFlags,
    ) -> CapturePolicy {
        CapturePolicy::Direct
    }

    fn is_restoring(&self) -> bool {
        true
    }
}

/// Phase pushed while a flushed context's transactions are processed, so
/// re-entrant mutations have somewhere to capture.
///
/// Inherits the flushed phase's explosion marker and always captures.
#[derive(Clone, Debug)]
pub struct Unwind {
    name: ArcStr,
    explosion: bool,
}

impl Unwind {
    /// An unwind phase wrapping `flushed`.
    pub fn wrapping(flushed: &dyn Phase) -> Self {
        Unwind {
            name: arcstr::format!("unwind({})", flushed.name()),
            explosion: flushed.is_explosion(),
        }
    }
}

impl Phase for Unwind {
    fn name(&self) -> ArcStr {
        self.name.clone()
    }

    fn capture_policy(
        &self,
        _: Position,
        _: &BlockState,
        _: ChangeFlags,
    ) -> CapturePolicy {
        CapturePolicy::Capture
    }

    fn is_explosion(&self) -> bool {
        self.explosion
    }
}

/// One entry of the [`PhaseStack`]: a phase plus everything captured and
/// attributed under it.
///
/// A context is created when a mutating code path begins, entered via the
/// engine, and consumed by the flush when that path ends. The pop yields
/// ownership, so a context cannot be read after its phase has ended.
#[derive(Debug)]
pub struct PhaseContext {
    phase: Arc<dyn Phase>,
    queue: TransactionQueue,
    bulk_captures: bool,
    source: Option<Cause>,
    notifier: Option<Cause>,
    owner: Option<Cause>,
    notification_source: Option<(Position, BlockState)>,
}

impl PhaseContext {
    /// Begin a context for `phase`, with bulk capture enabled and nothing
    /// attributed yet.
    pub fn new(phase: impl Phase + 'static) -> Self {
        PhaseContext {
            phase: Arc::new(phase),
            queue: TransactionQueue::new(),
            bulk_captures: true,
            source: None,
            notifier: None,
            owner: None,
            notification_source: None,
        }
    }

    /// Disable bulk capture: changes under this context apply directly even
    /// when the phase would capture them.
    #[must_use]
    pub fn without_bulk_captures(mut self) -> Self {
        self.bulk_captures = false;
        self
    }

    /// Attach the cause that initiated this context; flushed proposals carry
    /// it.
    #[must_use]
    pub fn with_source(mut self, source: Cause) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the cause doing the notifying, when distinct from the source.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Cause) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach the cause owning the affected blocks.
    #[must_use]
    pub fn with_owner(mut self, owner: Cause) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Override the source reported by neighbor notifications processed under
    /// this context.
    #[must_use]
    pub fn with_notification_source(mut self, position: Position, state: BlockState) -> Self {
        self.notification_source = Some((position, state));
        self
    }

    /// The phase marker.
    pub fn phase(&self) -> &dyn Phase {
        &*self.phase
    }

    pub(crate) fn phase_handle(&self) -> Arc<dyn Phase> {
        Arc::clone(&self.phase)
    }

    /// Transactions captured under this context so far.
    pub fn queue(&self) -> &TransactionQueue {
        &self.queue
    }

    pub(crate) fn queue_mut(&mut self) -> &mut TransactionQueue {
        &mut self.queue
    }

    pub(crate) fn take_queue(&mut self) -> TransactionQueue {
        mem::take(&mut self.queue)
    }

    /// Whether bulk capture is enabled.
    pub fn bulk_captures(&self) -> bool {
        self.bulk_captures
    }

    /// The initiating cause, if attached.
    pub fn source(&self) -> Option<&Cause> {
        self.source.as_ref()
    }

    /// The notifying cause, if attached.
    pub fn notifier(&self) -> Option<&Cause> {
        self.notifier.as_ref()
    }

    /// The owning cause, if attached.
    pub fn owner(&self) -> Option<&Cause> {
        self.owner.as_ref()
    }

    /// The notification-source override, if set.
    pub fn notification_source(&self) -> Option<&(Position, BlockState)> {
        self.notification_source.as_ref()
    }

    /// The effective policy for one proposed change: the phase's verdict,
    /// weakened to [`CapturePolicy::Direct`] when bulk capture is off.
    pub fn capture_policy(
        &self,
        position: Position,
        new_state: &BlockState,
        flags: ChangeFlags,
    ) -> CapturePolicy {
        if !self.bulk_captures {
            CapturePolicy::Direct
        } else {
            self.phase.capture_policy(position, new_state, flags)
        }
    }
}

/// The stack of active [`PhaseContext`]s, newest last.
///
/// Exactly one context is current at a time; they nest push-on-entry,
/// pop-on-exit with the engine driving both.
#[derive(Debug, Default)]
pub struct PhaseStack {
    contexts: Vec<PhaseContext>,
}

impl PhaseStack {
    /// Construct an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active contexts.
    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no context is active.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// The current (newest) context.
    pub fn current(&self) -> Option<&PhaseContext> {
        self.contexts.last()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut PhaseContext> {
        self.contexts.last_mut()
    }

    pub(crate) fn push(&mut self, context: PhaseContext) {
        self.contexts.push(context);
    }

    pub(crate) fn pop(&mut self) -> Option<PhaseContext> {
        self.contexts.pop()
    }
}
