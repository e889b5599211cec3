//! Cause attribution: who or what is responsible for a mutation, as exposed
//! to the event bus alongside each proposal.

use core::fmt;

use arcstr::ArcStr;

/// One attribution label explaining why a mutation occurred.
///
/// Opaque to the engine: hosts put whatever labels their event consumers
/// understand (a player id, a command name, a ticking block). Cloning is
/// cheap.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cause(ArcStr);

impl Cause {
    /// Construct a cause from a label.
    pub fn new(label: impl Into<ArcStr>) -> Self {
        Self(label.into())
    }

    /// The substitute used when a flushed context carries no cause at all.
    pub fn unknown() -> Self {
        Self(arcstr::literal!("unknown"))
    }

    /// The label.
    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered attribution frames, oldest first.
///
/// The engine consults the newest frame when a flushed context has no source
/// cause of its own.
#[derive(Clone, Debug, Default)]
pub struct CauseStack {
    frames: Vec<Cause>,
}

impl CauseStack {
    /// Construct an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frame is pushed.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Push one frame.
    pub fn push(&mut self, cause: Cause) {
        self.frames.push(cause);
    }

    /// Pop the newest frame.
    pub fn pop(&mut self) -> Option<Cause> {
        self.frames.pop()
    }

    /// Shrink back to `depth` frames, discarding newer ones.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    /// The frames, oldest first.
    pub fn frames(&self) -> &[Cause] {
        &self.frames
    }

    /// The newest frame.
    pub fn current(&self) -> Option<&Cause> {
        self.frames.last()
    }

    /// Push `cause` for a lexical region: the returned guard pops it (and any
    /// frames left unbalanced inside the region) when dropped.
    pub fn scope(&mut self, cause: Cause) -> CauseScope<'_> {
        let depth = self.frames.len();
        self.push(cause);
        CauseScope { stack: self, depth }
    }
}

/// Drop guard returned by [`CauseStack::scope`].
#[derive(Debug)]
pub struct CauseScope<'a> {
    stack: &'a mut CauseStack,
    depth: usize,
}

impl CauseScope<'_> {
    /// The stack, for pushing nested frames inside the scope.
    pub fn stack(&mut self) -> &mut CauseStack {
        self.stack
    }
}

impl Drop for CauseScope<'_> {
    fn drop(&mut self) {
        self.stack.frames.truncate(self.depth);
    }
}
