//! [`ChangeFlags`]: the per-write bitset deciding which reactions a block
//! change triggers.

bitflags::bitflags! {
    /// Options attached to every block-state write, consumed by the side-effect
    /// pipeline.
    ///
    /// The bit layout is a serialization contract with the host simulation and
    /// will not change: bits 0 through 5 are assigned in declaration order
    /// below. Use [`ChangeFlags::bits()`] / [`ChangeFlags::from_bits()`] at the
    /// host boundary.
    #[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(serde::Serialize, serde::Deserialize)]
    pub struct ChangeFlags: u8 {
        /// Send the change to connected clients.
        const NOTIFY_CLIENTS = 1 << 0;
        /// Run neighbor physics: each adjacent cell is told the source changed.
        const UPDATE_NEIGHBORS = 1 << 1;
        /// Run observer/shape updates on adjacent and diagonal cells.
        const NOTIFY_OBSERVERS = 1 << 2;
        /// Allow the changed cell itself to react (block physics).
        const PERFORM_BLOCK_PHYSICS = 1 << 3;
        /// The change is a destruction: break logic has already run or will
        /// run, so the quiet entity-detach path is skipped.
        const PERFORM_BLOCK_DESTRUCTION = 1 << 4;
        /// The block is being moved rather than created or destroyed
        /// (e.g. by a piston); reactions that assume loss of the block skip.
        const MOVING_BLOCKS = 1 << 5;
    }
}

impl ChangeFlags {
    /// The flags an ordinary gameplay write uses: everything except
    /// destruction and moving-blocks.
    pub const DEFAULT: Self = Self::NOTIFY_CLIENTS
        .union(Self::UPDATE_NEIGHBORS)
        .union(Self::NOTIFY_OBSERVERS)
        .union(Self::PERFORM_BLOCK_PHYSICS);

    /// The flags passed down when a shape update propagates to further cells:
    /// neighbor physics and moving-blocks are cleared so propagation cannot
    /// restart the full reaction cascade.
    #[must_use]
    #[inline]
    pub fn without_propagation(self) -> Self {
        self.difference(Self::UPDATE_NEIGHBORS.union(Self::MOVING_BLOCKS))
    }
}

impl Default for ChangeFlags {
    /// Returns [`ChangeFlags::DEFAULT`] (not the empty set).
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}
