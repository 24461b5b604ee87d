//! Mechanism link registry: levers and buttons bound to gates.
//!
//! Links live on the gate itself; this module validates changes, persists
//! the full link set after each one and answers reverse lookups.

use crate::error::{GateError, GateResult};
use crate::gate::Gate;
use crate::store::GateStore;
use crate::types::{BlockPos, GateId, MechanismLink};
use crate::world::BlockWorld;
use log::error;

#[derive(Debug, Clone, Copy)]
pub struct MechanismLinks {
    radius: f64,
}

impl MechanismLinks {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Bind the fixture at `pos` to `gate`.
    pub fn link(
        &self,
        gate: &mut Gate,
        pos: BlockPos,
        world: &dyn BlockWorld,
    ) -> GateResult<MechanismLink> {
        if gate.is_linked(pos) {
            return Err(GateError::AlreadyLinked);
        }
        let kind = world
            .block_at(gate.world(), pos)
            .mechanism_kind()
            .ok_or(GateError::NotAMechanism(pos))?;

        let distance = gate.center().distance(pos.to_vec3());
        if distance > self.radius {
            return Err(GateError::TooFar {
                distance,
                max: self.radius,
            });
        }

        gate.add_link(pos, kind);
        Ok(MechanismLink { pos, kind })
    }

    pub fn unlink(&self, gate: &mut Gate, pos: BlockPos) -> GateResult<()> {
        if gate.remove_link(pos) {
            Ok(())
        } else {
            Err(GateError::NotLinked)
        }
    }

    /// Gate the fixture at `pos` is bound to, if any. First match wins.
    pub fn find_gate_for<'a>(
        gates: impl IntoIterator<Item = &'a Gate>,
        world: &str,
        pos: BlockPos,
    ) -> Option<GateId> {
        gates
            .into_iter()
            .find(|gate| gate.world() == world && gate.is_linked(pos))
            .map(Gate::id)
    }

    /// Write the gate's complete link set. Failures are logged, not raised.
    pub fn persist(store: &dyn GateStore, gate: &Gate) {
        let links: Vec<MechanismLink> = gate
            .links()
            .iter()
            .map(|(pos, kind)| MechanismLink {
                pos: *pos,
                kind: *kind,
            })
            .collect();
        if let Err(e) = store.save_links(gate.id(), gate.world(), &links) {
            error!("Failed to save links for gate {}: {}", gate.id(), e);
        }
    }
}
