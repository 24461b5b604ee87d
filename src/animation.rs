//! Per-gate swing animation.
//!
//! An [`Animation`] is a resumable step function: the engine calls
//! [`Animation::step`] once per tick until it reports [`Step::Landed`], then
//! either lands the blocks or discards the swing.
//!
//! While a swing is in flight the gate's blocks live only as display
//! entities. Their pre-transition cells are emptied at start, and every
//! tick the cell under each display holds a transient marker that is
//! cleared again on the next tick.

use crate::gate::Gate;
use crate::obstruction::first_collision;
use crate::types::{BlockPos, BlockState, GateId};
use crate::world::{BlockWorld, DisplayId};

/// Quartic ease-in-out over a normalised progress value.
pub fn ease_in_out_quart(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    if p < 0.5 {
        8.0 * p * p * p * p
    } else {
        1.0 - (-2.0 * p + 2.0).powi(4) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Opening,
    Closing,
}

/// Result of advancing an animation by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Moving { progress: f64 },
    /// Progress reached 1; the swing is ready to commit.
    Landed,
}

#[derive(Debug, Clone)]
pub struct MovingBlock {
    pub from: BlockPos,
    pub to: BlockPos,
    pub state: BlockState,
    pub display: DisplayId,
}

#[derive(Debug)]
pub struct Animation {
    gate_id: GateId,
    world: String,
    direction: Direction,
    elapsed: u32,
    duration: u32,
    blocks: Vec<MovingBlock>,
    markers: Vec<BlockPos>,
}

impl Animation {
    /// Lift `gate`'s blocks out of the world into display entities.
    ///
    /// Must be called before the gate's open flag is flipped.
    pub fn start(gate: &Gate, world: &dyn BlockWorld, duration: u32) -> Self {
        let direction = if gate.is_open() {
            Direction::Closing
        } else {
            Direction::Opening
        };
        let geometry = gate.geometry();
        let blocks = gate
            .blocks()
            .iter()
            .map(|(origin, state)| {
                let from = geometry.position_in(*origin, gate.is_open());
                let to = geometry.position_in(*origin, !gate.is_open());
                world.set_block(gate.world(), from, BlockState::air());
                let display = world.spawn_display(gate.world(), from.to_vec3(), state);
                MovingBlock {
                    from,
                    to,
                    state: state.clone(),
                    display,
                }
            })
            .collect();

        Self {
            gate_id: gate.id(),
            world: gate.world().to_string(),
            direction,
            elapsed: 0,
            duration,
            blocks,
            markers: Vec::new(),
        }
    }

    pub fn gate_id(&self) -> GateId {
        self.gate_id
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    /// Whether any block of this swing lands on `pos`.
    pub fn lands_on(&self, pos: BlockPos) -> bool {
        self.blocks.iter().any(|b| b.to == pos)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn blocks(&self) -> &[MovingBlock] {
        &self.blocks
    }

    pub fn markers(&self) -> &[BlockPos] {
        &self.markers
    }

    pub fn progress(&self) -> f64 {
        if self.duration == 0 {
            1.0
        } else {
            (self.elapsed as f64 / self.duration as f64).min(1.0)
        }
    }

    pub fn step(&mut self, world: &dyn BlockWorld) -> Step {
        self.clear_markers(world);
        if self.elapsed >= self.duration {
            return Step::Landed;
        }

        self.elapsed += 1;
        let progress = self.progress();
        let eased = ease_in_out_quart(progress);

        for block in &self.blocks {
            let at = block.from.to_vec3().lerp(block.to.to_vec3(), eased);
            world.move_display(block.display, at);

            let cell = at.block();
            if world.block_at(&self.world, cell).is_air() {
                world.set_block(&self.world, cell, BlockState::marker());
                self.markers.push(cell);
            }
        }

        Step::Moving { progress }
    }

    /// First landing cell no longer free for this gate's blocks.
    pub fn collision(&self, world: &dyn BlockWorld) -> Option<BlockPos> {
        first_collision(&self.world, self.blocks.iter().map(|b| &b.to), world)
    }

    /// Write every block into its landing cell and drop the displays.
    pub fn land(mut self, world: &dyn BlockWorld) {
        self.clear_markers(world);
        for block in self.blocks.drain(..) {
            world.set_block(&self.world, block.to, block.state);
            world.remove_display(block.display);
        }
    }

    /// Drop the displays and markers without placing anything.
    pub fn discard(mut self, world: &dyn BlockWorld) {
        self.clear_markers(world);
        for block in self.blocks.drain(..) {
            world.remove_display(block.display);
        }
    }

    fn clear_markers(&mut self, world: &dyn BlockWorld) {
        for cell in self.markers.drain(..) {
            // Someone may have built over the marker since.
            if world.block_at(&self.world, cell).is_marker() {
                world.set_block(&self.world, cell, BlockState::air());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easing_hits_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_quart(0.0), 0.0);
        assert_eq!(ease_in_out_quart(1.0), 1.0);
        assert!((ease_in_out_quart(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn easing_is_monotonic() {
        let mut last = 0.0;
        for i in 0..=100 {
            let v = ease_in_out_quart(i as f64 / 100.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn easing_clamps_overshoot() {
        assert_eq!(ease_in_out_quart(1.3), 1.0);
        assert_eq!(ease_in_out_quart(-0.2), 0.0);
    }
}
