//! Integrity fingerprint of a gate's full state.
//!
//! The canonical form is `id|owner|TYPE|world|x1|y1|z1|x2|y2|z2|open|`
//! followed by `x,y,z:descriptor|` for every captured block in ascending
//! `(x, y, z)` order, hashed with SHA-256 and hex encoded.

use crate::gate::Gate;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Length of a hex-encoded fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

pub fn canonical_form(gate: &Gate) -> String {
    let (c1, c2) = gate.corners();
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|",
        gate.id(),
        gate.owner(),
        gate.gate_type(),
        gate.world(),
        c1.x,
        c1.y,
        c1.z,
        c2.x,
        c2.y,
        c2.z,
        gate.is_open(),
    );

    let mut blocks: Vec<_> = gate.blocks().iter().collect();
    blocks.sort_by_key(|(pos, _)| **pos);
    for (pos, state) in blocks {
        let _ = write!(out, "{},{},{}:{}|", pos.x, pos.y, pos.z, state);
    }
    out
}

pub fn fingerprint(gate: &Gate) -> String {
    hex::encode(Sha256::digest(canonical_form(gate).as_bytes()))
}

/// An empty stored digest predates fingerprinting and is trusted as-is.
pub fn verify(gate: &Gate, stored: &str) -> bool {
    stored.is_empty() || fingerprint(gate) == stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockPos, BlockState, GateType};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn gate(open: bool) -> Gate {
        let blocks: BTreeMap<_, _> = [(0, 64), (0, 65)]
            .into_iter()
            .map(|(x, y)| (BlockPos::new(x, y, 0), BlockState::new("minecraft:stone")))
            .collect();
        Gate::restore(
            Uuid::nil(),
            Uuid::nil(),
            "world",
            (BlockPos::new(0, 64, 0), BlockPos::new(0, 65, 0)),
            GateType::Normal,
            blocks,
            open,
        )
        .unwrap()
    }

    #[test]
    fn canonical_form_lists_blocks_in_order() {
        let form = canonical_form(&gate(false));
        let head = format!(
            "{}|{}|NORMAL|world|0|64|0|0|65|0|false|",
            Uuid::nil(),
            Uuid::nil()
        );
        assert!(form.starts_with(&head));
        assert!(form.ends_with("0,64,0:minecraft:stone|0,65,0:minecraft:stone|"));
    }

    #[test]
    fn open_flag_changes_fingerprint() {
        assert_ne!(fingerprint(&gate(false)), fingerprint(&gate(true)));
        assert_eq!(fingerprint(&gate(true)).len(), FINGERPRINT_LEN);
    }

    #[test]
    fn empty_digest_is_trusted() {
        assert!(verify(&gate(false), ""));
        assert!(!verify(&gate(false), "deadbeef"));
    }
}
