//! The values a world cell can hold: [`BlockState`], [`BlockEntity`], and the
//! captured-before-mutation [`Snapshot`] of both.

use core::fmt;
use std::sync::Arc;

use arcstr::ArcStr;
use manyfmt::Refmt as _;

use crate::math::Position;
use crate::util::ConciseDebug;

/// The state a cell holds when nothing has been placed in it.
///
/// Reading an address the storage has no entry for yields this, and writing it
/// is how a cell is emptied.
pub const VACANT: BlockState = BlockState {
    kind: arcstr::literal!("vacant"),
    variant: 0,
    luminance: 0,
    light_blocking: false,
};

/// Immutable identifier of a cell's type and properties.
///
/// Two states compare equal only if every component matches; there is no
/// ordering. The *kind* alone is the type identity: a change between two states
/// of the same kind is a property adjustment, while a change of kind is what
/// arms break logic and on-add logic during transaction processing.
///
/// Cloning is cheap (one reference count).
#[derive(Clone, Eq, Hash, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct BlockState {
    kind: ArcStr,
    variant: u16,
    luminance: u8,
    light_blocking: bool,
}

impl BlockState {
    /// Construct a state of the given kind with default properties:
    /// variant 0, no light emission, light-blocking.
    pub fn new(kind: impl Into<ArcStr>) -> Self {
        Self {
            kind: kind.into(),
            variant: 0,
            luminance: 0,
            light_blocking: true,
        }
    }

    /// Replace the property-variant number, distinguishing states of one kind.
    #[must_use]
    pub fn with_variant(mut self, variant: u16) -> Self {
        self.variant = variant;
        self
    }

    /// Replace the emitted light level.
    #[must_use]
    pub fn with_luminance(mut self, luminance: u8) -> Self {
        self.luminance = luminance;
        self
    }

    /// Replace whether this state blocks light propagation.
    #[must_use]
    pub fn with_light_blocking(mut self, light_blocking: bool) -> Self {
        self.light_blocking = light_blocking;
        self
    }

    /// The type identity of this state.
    #[inline]
    pub fn kind(&self) -> &ArcStr {
        &self.kind
    }

    /// The property-variant number.
    #[inline]
    pub fn variant(&self) -> u16 {
        self.variant
    }

    /// Emitted light level.
    #[inline]
    pub fn luminance(&self) -> u8 {
        self.luminance
    }

    /// Whether this state blocks light propagation.
    #[inline]
    pub fn blocks_light(&self) -> bool {
        self.light_blocking
    }

    /// Whether this state is [`VACANT`].
    #[inline]
    pub fn is_vacant(&self) -> bool {
        *self == VACANT
    }

    /// Whether `self` and `other` share a type identity, regardless of
    /// properties.
    #[inline]
    pub fn same_kind(&self, other: &BlockState) -> bool {
        self.kind == other.kind
    }

    /// Whether replacing `self` with `other` changes anything the light engine
    /// cares about: emission level or light blocking.
    #[inline]
    pub fn light_differs(&self, other: &BlockState) -> bool {
        self.luminance != other.luminance || self.light_blocking != other.light_blocking
    }
}

impl fmt::Debug for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            kind,
            variant,
            luminance,
            light_blocking,
        } = self;
        write!(f, "{kind}")?;
        if *variant != 0 {
            write!(f, "/{variant}")?;
        }
        if *luminance != 0 {
            write!(f, " lum{luminance}")?;
        }
        if !light_blocking && !self.is_vacant() {
            write!(f, " nonblocking")?;
        }
        Ok(())
    }
}

impl manyfmt::Fmt<ConciseDebug> for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, _: &ConciseDebug) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Auxiliary per-cell object bound 1:1 to a position while present.
///
/// The journal does not interpret the payload; it only snapshots, detaches,
/// attaches, and restores it. Cloning is cheap.
#[derive(Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct BlockEntity {
    kind: ArcStr,
    payload: Arc<[u8]>,
}

impl BlockEntity {
    /// Construct an entity of the given kind with an empty payload.
    pub fn new(kind: impl Into<ArcStr>) -> Self {
        Self {
            kind: kind.into(),
            payload: Arc::default(),
        }
    }

    /// Replace the payload bytes the host simulation interprets.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Arc<[u8]>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// The type identity of this entity.
    #[inline]
    pub fn kind(&self) -> &ArcStr {
        &self.kind
    }

    /// The opaque payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Debug for BlockEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { kind, payload } = self;
        write!(f, "BlockEntity({kind}, {} bytes)", payload.len())
    }
}

/// What one cell held before a mutation: the data that makes cancellation an
/// exact undo.
///
/// Captured through the proxy view at enqueue time and immutable thereafter.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[allow(clippy::exhaustive_structs)]
pub struct Snapshot {
    /// The cell this snapshot describes.
    pub position: Position,
    /// The state the cell held.
    pub state: BlockState,
    /// The entity bound to the cell, if any.
    pub entity: Option<BlockEntity>,
}

impl Snapshot {
    /// Construct a snapshot from its parts.
    #[inline]
    pub fn new(position: Position, state: BlockState, entity: Option<BlockEntity>) -> Self {
        Self {
            position,
            state,
            entity,
        }
    }
}

impl manyfmt::Fmt<ConciseDebug> for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, fopt: &ConciseDebug) -> fmt::Result {
        let Self {
            position,
            state,
            entity,
        } = self;
        write!(f, "{} {state:?}", position.refmt(fopt))?;
        if let Some(entity) = entity {
            write!(f, " +{}", entity.kind())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Position;
    use pretty_assertions::assert_eq;

    #[test]
    fn vacant_properties() {
        assert!(VACANT.is_vacant());
        assert!(!VACANT.blocks_light());
        assert_eq!(VACANT.luminance(), 0);
        assert!(!BlockState::new("stone").is_vacant());
    }

    #[test]
    fn kind_vs_full_equality() {
        let a = BlockState::new("stone");
        let b = BlockState::new("stone").with_variant(3);
        assert_ne!(a, b);
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&BlockState::new("dirt")));
    }

    #[test]
    fn light_differs_covers_both_properties() {
        let base = BlockState::new("lamp");
        assert!(!base.light_differs(&base));
        assert!(base.light_differs(&base.clone().with_luminance(14)));
        assert!(base.light_differs(&base.clone().with_light_blocking(false)));
        // A property variant alone is not a lighting change.
        assert!(!base.light_differs(&base.clone().with_variant(7)));
    }

    #[test]
    fn state_debug_forms() {
        assert_eq!(format!("{VACANT:?}"), "vacant");
        assert_eq!(format!("{:?}", BlockState::new("stone")), "stone");
        assert_eq!(
            format!("{:?}", BlockState::new("lamp").with_variant(2).with_luminance(14)),
            "lamp/2 lum14"
        );
        assert_eq!(
            format!("{:?}", BlockState::new("glass").with_light_blocking(false)),
            "glass nonblocking"
        );
    }

    #[test]
    fn entity_payload() {
        let chest = BlockEntity::new("chest").with_payload(vec![1, 2, 3]);
        assert_eq!(chest.payload(), &[1, 2, 3]);
        assert_eq!(chest, chest.clone());
        assert_ne!(chest, BlockEntity::new("chest"));
        assert_eq!(format!("{chest:?}"), "BlockEntity(chest, 3 bytes)");
    }

    #[test]
    fn snapshot_concise_form() {
        use manyfmt::Refmt as _;
        let snap = Snapshot::new(
            Position::new(1, 2, 3),
            BlockState::new("stone"),
            Some(BlockEntity::new("chest")),
        );
        assert_eq!(
            format!("{}", snap.refmt(&ConciseDebug)),
            "(1, 2, 3) stone +chest"
        );
    }
}
