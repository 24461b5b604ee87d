//! Obstruction checks run before a swing starts and again when it lands.
//!
//! The world is shared, so a clear path at start says nothing about the
//! state at commit. Both checks read the world fresh.

use crate::gate::Gate;
use crate::types::BlockPos;
use crate::world::BlockWorld;

/// Footprint the gate will occupy once its next transition completes.
pub fn target_footprint(gate: &Gate) -> Vec<BlockPos> {
    gate.footprint_for(!gate.is_open())
}

/// First cell of the upcoming target footprint holding solid content.
///
/// Air and transient markers do not obstruct. Static gates never are.
pub fn first_obstruction(gate: &Gate, world: &dyn BlockWorld) -> Option<BlockPos> {
    if gate.geometry().is_static() {
        return None;
    }
    target_footprint(gate)
        .into_iter()
        .find(|pos| !world.block_at(gate.world(), *pos).is_passable_for_gate())
}

pub fn is_path_obstructed(gate: &Gate, world: &dyn BlockWorld) -> bool {
    first_obstruction(gate, world).is_some()
}

/// First landing cell that a foreign actor filled during the swing.
pub fn first_collision<'a>(
    world_name: &str,
    targets: impl IntoIterator<Item = &'a BlockPos>,
    world: &dyn BlockWorld,
) -> Option<BlockPos> {
    targets
        .into_iter()
        .find(|pos| !world.block_at(world_name, **pos).is_passable_for_gate())
        .copied()
}
