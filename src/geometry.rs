//! Geometry model: movement axis, distance and per-block offsets.
//!
//! A [`Geometry`] is derived once from a gate's bounding box and type and
//! then reused by every other subsystem. All functions here are pure.

use crate::types::{BlockPos, GateType, Vec3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Largest absolute coordinate a gate corner may have on any axis.
///
/// Keeps every extent, offset and centre sum well inside `i32`.
pub const COORDINATE_LIMIT: i32 = 30_000_000;

pub fn in_coordinate_range(pos: BlockPos) -> bool {
    [pos.x, pos.y, pos.z]
        .iter()
        .all(|c| (-COORDINATE_LIMIT..=COORDINATE_LIMIT).contains(c))
}

/// Axis-aligned, inclusive block box spanned by two corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl Bounds {
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn extent_x(&self) -> i32 {
        self.max.x - self.min.x + 1
    }

    pub fn extent_y(&self) -> i32 {
        self.max.y - self.min.y + 1
    }

    pub fn extent_z(&self) -> i32 {
        self.max.z - self.min.z + 1
    }

    /// Number of cells in the box.
    pub fn volume(&self) -> i64 {
        i64::from(self.extent_x()) * i64::from(self.extent_y()) * i64::from(self.extent_z())
    }

    /// A gate must be a wall along one horizontal axis.
    pub fn is_flat(&self) -> bool {
        self.extent_x() == 1 || self.extent_z() == 1
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) as f64 / 2.0,
            (self.min.y + self.max.y) as f64 / 2.0,
            (self.min.z + self.max.z) as f64 / 2.0,
        )
    }

    /// Every block position inside the box, in ascending `(x, y, z)` order.
    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        (self.min.x..=self.max.x).flat_map(move |x| {
            (self.min.y..=self.max.y)
                .flat_map(move |y| (self.min.z..=self.max.z).map(move |z| BlockPos::new(x, y, z)))
        })
    }
}

// ---------------------------------------------------------------------------
// Axis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    HorizontalX,
    HorizontalZ,
}

impl Axis {
    /// The longer horizontal extent wins; ties resolve to X.
    pub fn of(bounds: &Bounds) -> Self {
        if bounds.extent_x() >= bounds.extent_z() {
            Axis::HorizontalX
        } else {
            Axis::HorizontalZ
        }
    }

    pub fn width(&self, bounds: &Bounds) -> i32 {
        match self {
            Axis::HorizontalX => bounds.extent_x(),
            Axis::HorizontalZ => bounds.extent_z(),
        }
    }

    fn component(&self, pos: BlockPos) -> i32 {
        match self {
            Axis::HorizontalX => pos.x,
            Axis::HorizontalZ => pos.z,
        }
    }

    fn shift(&self, pos: BlockPos, by: i32) -> BlockPos {
        match self {
            Axis::HorizontalX => pos.offset(by, 0, 0),
            Axis::HorizontalZ => pos.offset(0, 0, by),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry strategies
// ---------------------------------------------------------------------------

/// Movement strategy of one gate, selected from its type at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// Blocks rise by the box height.
    Vertical { axis: Axis, distance: i32 },
    /// Each half slides along `axis` away from the centre line.
    ///
    /// `center_sum` is twice the centre coordinate, which keeps the
    /// side test in integers.
    Split {
        axis: Axis,
        distance: i32,
        center_sum: i32,
    },
    /// No motion.
    Static { axis: Axis },
}

impl Geometry {
    pub fn new(bounds: &Bounds, gate_type: GateType) -> Self {
        let axis = Axis::of(bounds);
        match gate_type {
            GateType::Normal => Geometry::Vertical {
                axis,
                distance: bounds.extent_y(),
            },
            GateType::DoubleDoor => Geometry::Split {
                axis,
                distance: axis.width(bounds) / 2,
                center_sum: axis.component(bounds.min) + axis.component(bounds.max),
            },
            GateType::Lever => Geometry::Static { axis },
        }
    }

    pub fn axis(&self) -> Axis {
        match *self {
            Geometry::Vertical { axis, .. }
            | Geometry::Split { axis, .. }
            | Geometry::Static { axis } => axis,
        }
    }

    pub fn move_distance(&self) -> i32 {
        match *self {
            Geometry::Vertical { distance, .. } | Geometry::Split { distance, .. } => distance,
            Geometry::Static { .. } => 0,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Geometry::Static { .. })
    }

    /// Which half of a double door `pos` belongs to: -1 below the centre
    /// line, +1 above it. `None` for other gate types.
    pub fn side(&self, pos: BlockPos) -> Option<i32> {
        match *self {
            Geometry::Split {
                axis, center_sum, ..
            } => Some(if 2 * axis.component(pos) < center_sum {
                -1
            } else {
                1
            }),
            _ => None,
        }
    }

    /// Where the closed-footprint block at `pos` sits when the gate is open.
    pub fn open_position(&self, pos: BlockPos) -> BlockPos {
        match *self {
            Geometry::Vertical { distance, .. } => pos.offset(0, distance, 0),
            Geometry::Split { axis, distance, .. } => {
                let side = self.side(pos).unwrap_or(1);
                axis.shift(pos, side * distance)
            }
            Geometry::Static { .. } => pos,
        }
    }

    /// Where the closed-footprint block at `pos` sits in the given state.
    pub fn position_in(&self, pos: BlockPos, open: bool) -> BlockPos {
        if open {
            self.open_position(pos)
        } else {
            pos
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(a: (i32, i32, i32), b: (i32, i32, i32)) -> Bounds {
        Bounds::from_corners(BlockPos::new(a.0, a.1, a.2), BlockPos::new(b.0, b.1, b.2))
    }

    #[test]
    fn bounds_normalise_corner_order() {
        let b = bounds((5, 70, 2), (1, 64, 2));
        assert_eq!(b.min, BlockPos::new(1, 64, 2));
        assert_eq!(b.max, BlockPos::new(5, 70, 2));
        assert_eq!(b.positions().count(), 5 * 7);
    }

    #[test]
    fn volume_uses_wide_arithmetic() {
        let b = bounds((0, -COORDINATE_LIMIT, 0), (0, COORDINATE_LIMIT, 0));
        assert_eq!(b.volume(), 2 * COORDINATE_LIMIT as i64 + 1);
        assert!(in_coordinate_range(b.max));
        assert!(!in_coordinate_range(BlockPos::new(0, COORDINATE_LIMIT + 1, 0)));
    }

    #[test]
    fn axis_ties_resolve_to_x() {
        assert_eq!(Axis::of(&bounds((0, 0, 0), (0, 3, 0))), Axis::HorizontalX);
        assert_eq!(Axis::of(&bounds((0, 0, 0), (0, 3, 4))), Axis::HorizontalZ);
    }

    #[test]
    fn static_geometry_is_identity() {
        let g = Geometry::new(&bounds((0, 0, 0), (3, 2, 0)), GateType::Lever);
        let p = BlockPos::new(2, 1, 0);
        assert_eq!(g.move_distance(), 0);
        assert_eq!(g.open_position(p), p);
        assert_eq!(g.side(p), None);
    }

    #[test]
    fn split_on_z_axis_moves_along_z() {
        let g = Geometry::new(&bounds((4, 10, -2), (4, 12, 1)), GateType::DoubleDoor);
        assert_eq!(g.axis(), Axis::HorizontalZ);
        assert_eq!(g.move_distance(), 2);
        assert_eq!(g.open_position(BlockPos::new(4, 10, -2)), BlockPos::new(4, 10, -4));
        assert_eq!(g.open_position(BlockPos::new(4, 11, 1)), BlockPos::new(4, 11, 3));
    }
}
