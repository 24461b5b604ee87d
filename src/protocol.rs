//! Request, response and event types for the JSON-lines gate protocol.
//!
//! This module owns **every message that crosses the engine boundary**:
//! requests read by the driver, the responses written back, and the events
//! a [`GateEngine::tick`](crate::engine::GateEngine::tick) call produces.
//!
//! ## Design rules
//!
//! 1. Every type is `Serialize + Deserialize` with snake_case JSON.
//! 2. Requests are tagged by `op`, responses by `type` with a `data` body.
//! 3. Gate ids travel as UUID strings, positions as `{x, y, z}` objects.

use crate::engine::GateEngine;
use crate::error::GateError;
use crate::gate::{Gate, GateState};
use crate::types::{
    Actor, BlockPos, BlockState, EngineStats, GateId, GateType, MechanismLink, OwnerId,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Result of a successful gate creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCreated {
    pub gate_id: GateId,
    pub blocks_captured: usize,
}

/// Why a gate left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RemovalReason {
    /// Removed on request, original blocks restored.
    Removed,
    /// A constituent block was broken.
    Broken,
    /// A constituent block was caught in an explosion.
    Exploded,
    /// Stored fingerprint no longer matches the gate.
    Integrity,
    /// A foreign block appeared in a landing cell mid-swing.
    Collision { at: BlockPos },
    /// Requested by an operator.
    Forced,
}

impl RemovalReason {
    /// Whether the gate's original blocks were written back.
    pub fn restores_blocks(&self) -> bool {
        matches!(self, RemovalReason::Removed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRemoved {
    pub gate_id: GateId,
    #[serde(flatten)]
    pub reason: RemovalReason,
}

/// Outcome of a single broken block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BreakOutcome {
    /// The block belongs to no gate and no link.
    Ignored,
    /// A linked mechanism was broken; its gate was opened if closed and the
    /// link dropped.
    MechanismReleased { gate_id: GateId },
    /// A gate block was broken; the gate is gone and its blocks are not
    /// restored.
    GateDestroyed { gate_id: GateId },
    /// The breaker may not modify the gate; the caller should cancel the
    /// break.
    Denied { gate_id: GateId },
}

/// Gates touched by one explosion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplosionOutcome {
    pub released: Vec<GateId>,
    pub destroyed: Vec<GateId>,
}

// ---------------------------------------------------------------------------
// Tick events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCommitted {
    pub gate_id: GateId,
    pub is_open: bool,
}

/// Everything a single engine tick changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickEvents {
    /// The tick counter that produced this set of events.
    pub tick: u64,
    /// Animations still in flight after this tick.
    pub moving: usize,
    pub committed: Vec<TransitionCommitted>,
    /// Gates torn down by a mid-swing collision.
    pub removed: Vec<GateRemoved>,
    /// Records written by a deferred flush this tick.
    pub saved: usize,
}

impl TickEvents {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.moving == 0 && self.committed.is_empty() && self.removed.is_empty() && self.saved == 0
    }
}

// ---------------------------------------------------------------------------
// Gate summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSummary {
    pub gate_id: GateId,
    pub owner: OwnerId,
    pub world: String,
    pub gate_type: GateType,
    pub state: GateState,
    pub corner1: BlockPos,
    pub corner2: BlockPos,
    pub blocks: usize,
    pub links: Vec<MechanismLink>,
}

impl From<&Gate> for GateSummary {
    fn from(gate: &Gate) -> Self {
        let (corner1, corner2) = gate.corners();
        Self {
            gate_id: gate.id(),
            owner: gate.owner(),
            world: gate.world().to_string(),
            gate_type: gate.gate_type(),
            state: gate.state(),
            corner1,
            corner2,
            blocks: gate.blocks().len(),
            links: gate
                .links()
                .iter()
                .map(|(pos, kind)| MechanismLink {
                    pos: *pos,
                    kind: *kind,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GateRequest {
    Create {
        actor: Actor,
        world: String,
        corner1: BlockPos,
        corner2: BlockPos,
        #[serde(default = "default_gate_type")]
        gate_type: GateType,
    },
    Toggle {
        actor: Actor,
        gate_id: GateId,
    },
    ToggleAt {
        actor: Actor,
        world: String,
        pos: BlockPos,
    },
    Remove {
        actor: Actor,
        gate_id: GateId,
    },
    Link {
        actor: Actor,
        gate_id: GateId,
        pos: BlockPos,
    },
    Unlink {
        actor: Actor,
        gate_id: GateId,
        pos: BlockPos,
    },
    MechanismUsed {
        world: String,
        pos: BlockPos,
    },
    BlockBroken {
        actor: Actor,
        world: String,
        pos: BlockPos,
    },
    Explosion {
        world: String,
        positions: Vec<BlockPos>,
    },
    /// Write a block into the hosted world, as another actor would.
    SetBlock {
        world: String,
        pos: BlockPos,
        block: BlockState,
    },
    Gate {
        gate_id: GateId,
    },
    Stats,
    Shutdown,
}

fn default_gate_type() -> GateType {
    GateType::Normal
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GateResponse {
    Created(GateCreated),
    State { gate_id: GateId, state: GateState },
    Removed { gate_id: GateId },
    Linked(MechanismLink),
    Unlinked { pos: BlockPos },
    Break(BreakOutcome),
    Explosion(ExplosionOutcome),
    BlockSet { pos: BlockPos },
    Gate(GateSummary),
    Stats(EngineStats),
    ShutDown { saved: usize },
    Error { message: String },
}

impl From<GateError> for GateResponse {
    fn from(e: GateError) -> Self {
        GateResponse::Error {
            message: e.to_string(),
        }
    }
}

/// Apply one request to the engine and build its response.
pub fn dispatch(engine: &mut GateEngine, request: GateRequest) -> GateResponse {
    let result = match request {
        GateRequest::Create {
            actor,
            world,
            corner1,
            corner2,
            gate_type,
        } => engine
            .create_gate(&actor, &world, corner1, corner2, gate_type)
            .map(GateResponse::Created),
        GateRequest::Toggle { actor, gate_id } => engine
            .toggle(&actor, gate_id)
            .map(|state| GateResponse::State { gate_id, state }),
        GateRequest::ToggleAt { actor, world, pos } => engine
            .toggle_at(&actor, &world, pos)
            .map(|(gate_id, state)| GateResponse::State { gate_id, state }),
        GateRequest::Remove { actor, gate_id } => engine
            .remove_gate(&actor, gate_id)
            .map(|()| GateResponse::Removed { gate_id }),
        GateRequest::Link {
            actor,
            gate_id,
            pos,
        } => engine.link(&actor, gate_id, pos).map(GateResponse::Linked),
        GateRequest::Unlink {
            actor,
            gate_id,
            pos,
        } => engine
            .unlink(&actor, gate_id, pos)
            .map(|()| GateResponse::Unlinked { pos }),
        GateRequest::MechanismUsed { world, pos } => engine
            .mechanism_used(&world, pos)
            .map(|(gate_id, state)| GateResponse::State { gate_id, state }),
        GateRequest::BlockBroken { actor, world, pos } => {
            Ok(GateResponse::Break(engine.block_broken(&actor, &world, pos)))
        }
        GateRequest::Explosion { world, positions } => {
            Ok(GateResponse::Explosion(engine.explosion(&world, &positions)))
        }
        GateRequest::SetBlock { world, pos, block } => {
            engine.world().set_block(&world, pos, block);
            Ok(GateResponse::BlockSet { pos })
        }
        GateRequest::Gate { gate_id } => engine
            .gate(gate_id)
            .map(|gate| GateResponse::Gate(GateSummary::from(gate)))
            .ok_or(GateError::NotFound(gate_id)),
        GateRequest::Stats => Ok(GateResponse::Stats(engine.stats())),
        GateRequest::Shutdown => Ok(GateResponse::ShutDown {
            saved: engine.shutdown(),
        }),
    };
    result.unwrap_or_else(GateResponse::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_op_tag() {
        let line = r#"{"op":"toggle","actor":{"id":"00000000-0000-0000-0000-000000000001"},"gate_id":"00000000-0000-0000-0000-000000000002"}"#;
        let req: GateRequest = serde_json::from_str(line).unwrap();
        match req {
            GateRequest::Toggle { actor, .. } => assert!(!actor.is_admin),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn create_defaults_to_normal_gate() {
        let line = r#"{"op":"create","actor":{"id":"00000000-0000-0000-0000-000000000001"},"world":"w","corner1":{"x":0,"y":64,"z":0},"corner2":{"x":0,"y":67,"z":0}}"#;
        let req: GateRequest = serde_json::from_str(line).unwrap();
        assert!(matches!(
            req,
            GateRequest::Create {
                gate_type: GateType::Normal,
                ..
            }
        ));
    }

    #[test]
    fn error_response_shape() {
        let json = serde_json::to_value(GateResponse::from(GateError::Busy)).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json["data"]["message"].as_str().unwrap().contains("moving"));
    }

    #[test]
    fn removal_reason_flattens_into_notice() {
        let notice = GateRemoved {
            gate_id: GateId::nil(),
            reason: RemovalReason::Collision {
                at: BlockPos::new(1, 2, 3),
            },
        };
        let json = serde_json::to_value(notice).unwrap();
        assert_eq!(json["reason"], "collision");
        assert_eq!(json["at"]["y"], 2);
    }
}
