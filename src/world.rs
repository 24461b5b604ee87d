//! World access: the block grid and transient display entities.
//!
//! The engine never owns the world. It reads and writes blocks through
//! [`BlockWorld`], which other actors may mutate at any time between calls.

use crate::types::{BlockPos, BlockState, Vec3};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle of a spawned interpolation entity.
pub type DisplayId = u64;

// ---------------------------------------------------------------------------
// Environment trait
// ---------------------------------------------------------------------------

pub trait BlockWorld: Send + Sync {
    /// Current content of a cell; unloaded or unknown cells read as air.
    fn block_at(&self, world: &str, pos: BlockPos) -> BlockState;

    fn set_block(&self, world: &str, pos: BlockPos, state: BlockState);

    /// Spawn a block-shaped display entity at a continuous position.
    fn spawn_display(&self, world: &str, at: Vec3, state: &BlockState) -> DisplayId;

    fn move_display(&self, id: DisplayId, to: Vec3);

    fn remove_display(&self, id: DisplayId);
}

// ---------------------------------------------------------------------------
// In-memory world
// ---------------------------------------------------------------------------

/// A display entity tracked by [`MemoryWorld`].
#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    pub world: String,
    pub position: Vec3,
    pub state: BlockState,
}

/// Sparse, thread-safe block grid. Cells that were never written are air.
pub struct MemoryWorld {
    blocks: RwLock<HashMap<(String, BlockPos), BlockState>>,
    displays: RwLock<HashMap<DisplayId, Display>>,
    next_display: AtomicU64,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            displays: RwLock::new(HashMap::new()),
            next_display: AtomicU64::new(1),
        }
    }

    /// Set every cell of the inclusive box `a..=b` to `state`.
    pub fn fill(&self, world: &str, a: BlockPos, b: BlockPos, state: &BlockState) {
        let bounds = crate::geometry::Bounds::from_corners(a, b);
        for pos in bounds.positions() {
            self.set_block(world, pos, state.clone());
        }
    }

    /// Number of non-air cells.
    pub fn solid_count(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn display_count(&self) -> usize {
        self.displays.read().len()
    }

    pub fn display(&self, id: DisplayId) -> Option<Display> {
        self.displays.read().get(&id).cloned()
    }

    pub fn displays(&self) -> Vec<Display> {
        self.displays.read().values().cloned().collect()
    }

    /// Positions currently holding a transient marker.
    pub fn markers(&self, world: &str) -> Vec<BlockPos> {
        self.blocks
            .read()
            .iter()
            .filter(|((w, _), state)| w == world && state.is_marker())
            .map(|((_, pos), _)| *pos)
            .collect()
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockWorld for MemoryWorld {
    fn block_at(&self, world: &str, pos: BlockPos) -> BlockState {
        self.blocks
            .read()
            .get(&(world.to_string(), pos))
            .cloned()
            .unwrap_or_else(BlockState::air)
    }

    fn set_block(&self, world: &str, pos: BlockPos, state: BlockState) {
        let mut blocks = self.blocks.write();
        if state.is_air() {
            blocks.remove(&(world.to_string(), pos));
        } else {
            blocks.insert((world.to_string(), pos), state);
        }
    }

    fn spawn_display(&self, world: &str, at: Vec3, state: &BlockState) -> DisplayId {
        let id = self.next_display.fetch_add(1, Ordering::Relaxed);
        self.displays.write().insert(
            id,
            Display {
                world: world.to_string(),
                position: at,
                state: state.clone(),
            },
        );
        id
    }

    fn move_display(&self, id: DisplayId, to: Vec3) {
        if let Some(display) = self.displays.write().get_mut(&id) {
            display.position = to;
        }
    }

    fn remove_display(&self, id: DisplayId) {
        self.displays.write().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_cells_read_as_air() {
        let w = MemoryWorld::new();
        assert!(w.block_at("overworld", BlockPos::new(1, 2, 3)).is_air());
    }

    #[test]
    fn writing_air_frees_the_cell() {
        let w = MemoryWorld::new();
        let p = BlockPos::new(0, 64, 0);
        w.set_block("overworld", p, BlockState::new("minecraft:stone"));
        assert_eq!(w.solid_count(), 1);
        w.set_block("overworld", p, BlockState::air());
        assert_eq!(w.solid_count(), 0);
    }

    #[test]
    fn worlds_are_isolated() {
        let w = MemoryWorld::new();
        let p = BlockPos::new(0, 64, 0);
        w.set_block("overworld", p, BlockState::new("minecraft:stone"));
        assert!(w.block_at("nether", p).is_air());
    }
}
