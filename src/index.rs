//! Spatial index: which gate occupies a given world block.
//!
//! Entries are derived from a gate's current footprint. A footprint change
//! replaces every entry of the gate in one call, so no caller ever sees a
//! position owned by zero or two gates because of a half-applied update.

use crate::types::{BlockPos, GateId};
use std::collections::HashMap;

/// A position that another gate already owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConflict {
    pub pos: BlockPos,
    pub owner: GateId,
}

#[derive(Debug, Default)]
pub struct SpatialIndex {
    cells: HashMap<(String, BlockPos), GateId>,
    by_gate: HashMap<GateId, (String, Vec<BlockPos>)>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate_at(&self, world: &str, pos: BlockPos) -> Option<GateId> {
        self.cells.get(&(world.to_string(), pos)).copied()
    }

    /// First position in `positions` owned by a gate other than `id`.
    pub fn conflict(
        &self,
        id: GateId,
        world: &str,
        positions: &[BlockPos],
    ) -> Option<IndexConflict> {
        positions.iter().find_map(|pos| match self.gate_at(world, *pos) {
            Some(owner) if owner != id => Some(IndexConflict { pos: *pos, owner }),
            _ => None,
        })
    }

    /// Replace all entries of gate `id` with `positions`.
    ///
    /// Fails without touching the index if any position belongs to another
    /// gate.
    pub fn replace(
        &mut self,
        id: GateId,
        world: &str,
        positions: Vec<BlockPos>,
    ) -> Result<(), IndexConflict> {
        if let Some(conflict) = self.conflict(id, world, &positions) {
            return Err(conflict);
        }
        self.remove_gate(id);
        for pos in &positions {
            self.cells.insert((world.to_string(), *pos), id);
        }
        self.by_gate.insert(id, (world.to_string(), positions));
        Ok(())
    }

    /// Drop every entry owned by `id`. Returns how many were removed.
    pub fn remove_gate(&mut self, id: GateId) -> usize {
        let Some((world, positions)) = self.by_gate.remove(&id) else {
            return 0;
        };
        let mut removed = 0;
        for pos in positions {
            let key = (world.clone(), pos);
            if self.cells.get(&key) == Some(&id) {
                self.cells.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    pub fn positions_of(&self, id: GateId) -> &[BlockPos] {
        self.by_gate
            .get(&id)
            .map(|(_, positions)| positions.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.by_gate.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn row(y: i32, n: i32) -> Vec<BlockPos> {
        (0..n).map(|x| BlockPos::new(x, y, 0)).collect()
    }

    #[test]
    fn replace_moves_every_entry() {
        let mut index = SpatialIndex::new();
        let id = Uuid::new_v4();
        index.replace(id, "w", row(64, 3)).unwrap();
        index.replace(id, "w", row(70, 3)).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.gate_at("w", BlockPos::new(1, 64, 0)), None);
        assert_eq!(index.gate_at("w", BlockPos::new(1, 70, 0)), Some(id));
    }

    #[test]
    fn conflicting_replace_leaves_index_untouched() {
        let mut index = SpatialIndex::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        index.replace(a, "w", row(64, 3)).unwrap();
        index.replace(b, "w", row(65, 3)).unwrap();

        let err = index.replace(b, "w", row(64, 1)).unwrap_err();
        assert_eq!(err.owner, a);
        assert_eq!(index.positions_of(b), row(65, 3).as_slice());
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn remove_gate_clears_only_its_entries() {
        let mut index = SpatialIndex::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        index.replace(a, "w", row(64, 2)).unwrap();
        index.replace(b, "w", row(80, 2)).unwrap();

        assert_eq!(index.remove_gate(a), 2);
        assert_eq!(index.remove_gate(a), 0);
        assert_eq!(index.len(), 2);
    }
}
