//! Integer grid geometry: [`Position`], [`Facing`], and the point/vector
//! aliases the rest of the crate builds on.

use core::fmt;
use core::ops;

use crate::util::ConciseDebug;

/// Scalar type of world-grid coordinates.
pub type Coord = i32;

/// A point on the world grid, distinguished from [`Position`] in that it does not
/// identify a cell.
pub type GridPoint = euclid::Point3D<Coord, Position>;

/// A displacement on the world grid.
pub type GridVector = euclid::Vector3D<Coord, Position>;

/// Edge length of the cubical sections the light engine tracks emptiness for.
pub const SECTION_SIZE: Coord = 16;

/// Identifies one cell of the world grid by its integer coordinates.
///
/// `Position` is the key every snapshot, transaction, and overlay entry is
/// addressed by. It is plain data: three `i32`s without padding, so buffers of
/// positions may be reinterpreted as `[i32; 3]`s when the host needs to ship
/// them across an FFI or GPU boundary.
#[derive(Clone, Copy, Eq, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[allow(clippy::exhaustive_structs)]
#[repr(C)]
pub struct Position {
    #[allow(missing_docs)]
    pub x: Coord,
    #[allow(missing_docs)]
    pub y: Coord,
    #[allow(missing_docs)]
    pub z: Coord,
}

impl core::hash::Hash for Position {
    #[inline]
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        // Pack two coordinates into one 64-bit input so hashers that work on
        // 64-bit quantities see fewer pieces.
        (u64::from(self.x.cast_unsigned()) ^ (u64::from(self.y.cast_unsigned()) << 32)).hash(state);
        self.z.hash(state);
    }
}

impl Position {
    /// Equal to `Position::new(0, 0, 0)`.
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    /// Construct `Position { x, y, z }` from the given coordinates.
    #[inline]
    pub const fn new(x: Coord, y: Coord, z: Coord) -> Self {
        Self { x, y, z }
    }

    /// This position as a [`GridPoint`].
    #[inline]
    pub fn to_point(self) -> GridPoint {
        GridPoint::new(self.x, self.y, self.z)
    }

    /// Componentwise [`i32::checked_add()`].
    #[must_use]
    #[inline]
    pub fn checked_add(self, v: GridVector) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(v.x)?,
            y: self.y.checked_add(v.y)?,
            z: self.z.checked_add(v.z)?,
        })
    }

    /// Componentwise [`i32::wrapping_add()`].
    #[must_use]
    #[inline]
    pub fn wrapping_add(self, v: GridVector) -> Self {
        Self {
            x: self.x.wrapping_add(v.x),
            y: self.y.wrapping_add(v.y),
            z: self.z.wrapping_add(v.z),
        }
    }

    /// The six positions sharing a face with this one, in [`Facing::ALL`] order.
    ///
    /// Coordinates wrap on overflow; the world boundary is the storage's concern,
    /// not this type's.
    #[inline]
    pub fn adjacent(self) -> [Self; 6] {
        Facing::ALL.map(|f| self.wrapping_add(f.vector()))
    }

    /// The most negative corner of the [`SECTION_SIZE`]³ aligned region containing
    /// this position.
    #[must_use]
    #[inline]
    pub fn section_origin(self) -> Self {
        self.map(|c| c.div_euclid(SECTION_SIZE) * SECTION_SIZE)
    }

    /// Apply a function to each coordinate independently.
    #[must_use]
    #[inline]
    pub fn map(self, mut f: impl FnMut(Coord) -> Coord) -> Self {
        Self {
            x: f(self.x),
            y: f(self.y),
            z: f(self.z),
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { x, y, z } = self;
        write!(f, "({x}, {y}, {z})")
    }
}

impl manyfmt::Fmt<ConciseDebug> for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, _: &ConciseDebug) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<Position> for GridPoint {
    #[inline]
    fn from(p: Position) -> Self {
        p.to_point()
    }
}

impl From<GridPoint> for Position {
    #[inline]
    fn from(p: GridPoint) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl From<[Coord; 3]> for Position {
    #[inline]
    fn from([x, y, z]: [Coord; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Position> for [Coord; 3] {
    #[inline]
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

impl ops::Add<GridVector> for Position {
    type Output = Self;
    #[inline]
    fn add(self, rhs: GridVector) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl ops::Sub<GridVector> for Position {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: GridVector) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl ops::Sub<Position> for Position {
    type Output = GridVector;
    #[inline]
    fn sub(self, rhs: Position) -> Self::Output {
        GridVector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// One of the six axis-aligned unit directions; the direction a neighbor
/// notification or shape update travels.
#[expect(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, exhaust::Exhaust)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Facing {
    /// Negative X; unit vector `(-1, 0, 0)`.
    NX,
    /// Negative Y; unit vector `(0, -1, 0)`; downward.
    NY,
    /// Negative Z; unit vector `(0, 0, -1)`.
    NZ,
    /// Positive X; unit vector `(1, 0, 0)`.
    PX,
    /// Positive Y; unit vector `(0, 1, 0)`; upward.
    PY,
    /// Positive Z; unit vector `(0, 0, 1)`.
    PZ,
}

impl Facing {
    /// All six directions, in declaration order.
    pub const ALL: [Facing; 6] = [
        Facing::NX,
        Facing::NY,
        Facing::NZ,
        Facing::PX,
        Facing::PY,
        Facing::PZ,
    ];

    /// The unit vector of this direction.
    #[inline]
    pub const fn vector(self) -> GridVector {
        match self {
            Facing::NX => GridVector::new(-1, 0, 0),
            Facing::NY => GridVector::new(0, -1, 0),
            Facing::NZ => GridVector::new(0, 0, -1),
            Facing::PX => GridVector::new(1, 0, 0),
            Facing::PY => GridVector::new(0, 1, 0),
            Facing::PZ => GridVector::new(0, 0, 1),
        }
    }

    /// The direction whose vector is the negation of this one's.
    #[must_use]
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Facing::NX => Facing::PX,
            Facing::NY => Facing::PY,
            Facing::NZ => Facing::PZ,
            Facing::PX => Facing::NX,
            Facing::PY => Facing::NY,
            Facing::PZ => Facing::NZ,
        }
    }
}
