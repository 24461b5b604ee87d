//! Gate entity and the registry of active gates.

use crate::error::{GateError, GateResult};
use crate::geometry::{in_coordinate_range, Bounds, Geometry};
use crate::types::{BlockPos, BlockState, GateId, GateType, LinkKind, OwnerId, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Logical position of a gate in its open/close cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// A managed block assembly with a closed and an open footprint.
///
/// Identity, corners, type and captured blocks never change after
/// construction. Only the open/animating flags and the mechanism links are
/// mutable, and only from inside this crate.
#[derive(Debug, Clone)]
pub struct Gate {
    id: GateId,
    owner: OwnerId,
    world: String,
    corner1: BlockPos,
    corner2: BlockPos,
    gate_type: GateType,
    blocks: BTreeMap<BlockPos, BlockState>,
    bounds: Bounds,
    geometry: Geometry,
    is_open: bool,
    is_animating: bool,
    links: BTreeMap<BlockPos, LinkKind>,
}

impl Gate {
    /// Build a gate, enforcing the geometry and content invariants.
    pub fn new(
        id: GateId,
        owner: OwnerId,
        world: impl Into<String>,
        corner1: BlockPos,
        corner2: BlockPos,
        gate_type: GateType,
        blocks: BTreeMap<BlockPos, BlockState>,
    ) -> GateResult<Self> {
        let bounds = validate_box(corner1, corner2, gate_type)?;
        if blocks.is_empty() {
            return Err(GateError::EmptySelection);
        }
        if let Some(stray) = blocks.keys().find(|p| !bounds.contains(**p)) {
            return Err(GateError::OutOfBounds(*stray));
        }

        Ok(Self {
            id,
            owner,
            world: world.into(),
            corner1,
            corner2,
            gate_type,
            blocks,
            bounds,
            geometry: Geometry::new(&bounds, gate_type),
            is_open: false,
            is_animating: false,
            links: BTreeMap::new(),
        })
    }

    /// Rebuild a persisted gate in the given open state.
    pub fn restore(
        id: GateId,
        owner: OwnerId,
        world: impl Into<String>,
        corners: (BlockPos, BlockPos),
        gate_type: GateType,
        blocks: BTreeMap<BlockPos, BlockState>,
        is_open: bool,
    ) -> GateResult<Self> {
        let mut gate = Self::new(id, owner, world, corners.0, corners.1, gate_type, blocks)?;
        gate.is_open = is_open;
        Ok(gate)
    }

    pub fn id(&self) -> GateId {
        self.id
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn corners(&self) -> (BlockPos, BlockPos) {
        (self.corner1, self.corner2)
    }

    pub fn gate_type(&self) -> GateType {
        self.gate_type
    }

    pub fn blocks(&self) -> &BTreeMap<BlockPos, BlockState> {
        &self.blocks
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_animating(&self) -> bool {
        self.is_animating
    }

    pub fn center(&self) -> Vec3 {
        self.bounds.center()
    }

    pub fn state(&self) -> GateState {
        // `is_open` already holds the destination while a swing is in flight.
        match (self.is_open, self.is_animating) {
            (false, false) => GateState::Closed,
            (true, true) => GateState::Opening,
            (true, false) => GateState::Open,
            (false, true) => GateState::Closing,
        }
    }

    pub fn links(&self) -> &BTreeMap<BlockPos, LinkKind> {
        &self.links
    }

    pub fn is_linked(&self, pos: BlockPos) -> bool {
        self.links.contains_key(&pos)
    }

    /// Positions the gate occupies in the given state.
    pub fn footprint_for(&self, open: bool) -> Vec<BlockPos> {
        self.blocks
            .keys()
            .map(|p| self.geometry.position_in(*p, open))
            .collect()
    }

    /// Positions the gate occupies right now.
    pub fn footprint(&self) -> Vec<BlockPos> {
        self.footprint_for(self.is_open)
    }

    pub(crate) fn begin_transition(&mut self) {
        self.is_animating = true;
        self.is_open = !self.is_open;
    }

    pub(crate) fn finish_transition(&mut self) {
        self.is_animating = false;
    }

    pub(crate) fn add_link(&mut self, pos: BlockPos, kind: LinkKind) -> bool {
        self.links.insert(pos, kind).is_none()
    }

    pub(crate) fn remove_link(&mut self, pos: BlockPos) -> bool {
        self.links.remove(&pos).is_some()
    }

    pub(crate) fn set_links(&mut self, links: impl IntoIterator<Item = (BlockPos, LinkKind)>) {
        self.links = links.into_iter().collect();
    }
}

/// Check that two corners describe a box a gate of `gate_type` may span.
pub fn validate_box(corner1: BlockPos, corner2: BlockPos, gate_type: GateType) -> GateResult<Bounds> {
    if corner1 == corner2 {
        return Err(GateError::SameCorner);
    }
    if let Some(far) = [corner1, corner2].into_iter().find(|c| !in_coordinate_range(*c)) {
        return Err(GateError::OutOfWorld(far));
    }
    let bounds = Bounds::from_corners(corner1, corner2);
    if !bounds.is_flat() {
        return Err(GateError::NotAxisAligned);
    }
    if gate_type == GateType::DoubleDoor {
        let width = Geometry::new(&bounds, gate_type).axis().width(&bounds);
        if width % 2 != 0 {
            return Err(GateError::OddDoubleDoorWidth { width });
        }
    }
    Ok(bounds)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds every active gate, keyed by id.
pub struct GateRegistry {
    gates: HashMap<GateId, Gate>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self {
            gates: HashMap::new(),
        }
    }

    pub fn insert(&mut self, gate: Gate) {
        self.gates.insert(gate.id, gate);
    }

    pub fn remove(&mut self, id: GateId) -> Option<Gate> {
        self.gates.remove(&id)
    }

    pub fn get(&self, id: GateId) -> Option<&Gate> {
        self.gates.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: GateId) -> Option<&mut Gate> {
        self.gates.get_mut(&id)
    }

    pub fn contains(&self, id: GateId) -> bool {
        self.gates.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gate> {
        self.gates.values()
    }

    pub fn ids(&self) -> Vec<GateId> {
        self.gates.keys().copied().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.gates.clear();
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn column(height: i32) -> BTreeMap<BlockPos, BlockState> {
        (0..height)
            .map(|dy| (BlockPos::new(0, 64 + dy, 0), BlockState::new("minecraft:oak_planks")))
            .collect()
    }

    #[test]
    fn state_follows_flags() {
        let mut gate = Gate::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "world",
            BlockPos::new(0, 64, 0),
            BlockPos::new(0, 67, 0),
            GateType::Normal,
            column(4),
        )
        .unwrap();
        assert_eq!(gate.state(), GateState::Closed);
        gate.begin_transition();
        assert_eq!(gate.state(), GateState::Opening);
        gate.finish_transition();
        assert_eq!(gate.state(), GateState::Open);
        gate.begin_transition();
        assert_eq!(gate.state(), GateState::Closing);
    }

    #[test]
    fn rejects_blocks_outside_the_box() {
        let mut blocks = column(2);
        blocks.insert(BlockPos::new(3, 64, 0), BlockState::new("minecraft:stone"));
        let err = Gate::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "world",
            BlockPos::new(0, 64, 0),
            BlockPos::new(0, 65, 0),
            GateType::Normal,
            blocks,
        )
        .unwrap_err();
        assert_eq!(err, GateError::OutOfBounds(BlockPos::new(3, 64, 0)));
    }

    #[test]
    fn double_door_width_must_be_even() {
        let err = validate_box(
            BlockPos::new(0, 64, 0),
            BlockPos::new(4, 66, 0),
            GateType::DoubleDoor,
        )
        .unwrap_err();
        assert_eq!(err, GateError::OddDoubleDoorWidth { width: 5 });
    }
}
