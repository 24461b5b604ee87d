//! Core value types shared across all modules.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a gate, assigned at creation.
pub type GateId = Uuid;

/// Identifier of the actor that created a gate.
pub type OwnerId = Uuid;

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

/// Integer lattice position of a single block inside one world.
///
/// Ordering is lexicographic on `(x, y, z)`, which is the canonical order
/// used for fingerprinting.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Position of the block's minimum corner in continuous space.
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

/// Continuous position used for interpolation entities and distances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn lerp(self, to: Vec3, t: f64) -> Vec3 {
        Vec3::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    pub fn distance(self, other: Vec3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// The block cell containing this point.
    pub fn block(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Block content
// ---------------------------------------------------------------------------

/// Material descriptor of a world block, e.g. `minecraft:oak_fence[east=true]`.
///
/// Stored and compared verbatim; only the material name before any `[`
/// state suffix is interpreted.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockState(String);

impl BlockState {
    pub const AIR: &'static str = "minecraft:air";
    /// Impassable marker placed under moving blocks for a single tick.
    pub const MARKER: &'static str = "minecraft:barrier";
    pub const LEVER: &'static str = "minecraft:lever";

    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    pub fn air() -> Self {
        Self::new(Self::AIR)
    }

    pub fn marker() -> Self {
        Self::new(Self::MARKER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn material(&self) -> &str {
        self.0.split('[').next().unwrap_or(&self.0)
    }

    pub fn is_air(&self) -> bool {
        matches!(
            self.material(),
            "minecraft:air" | "minecraft:cave_air" | "minecraft:void_air"
        )
    }

    pub fn is_marker(&self) -> bool {
        self.material() == Self::MARKER
    }

    /// Empty or holding only a transient marker.
    pub fn is_passable_for_gate(&self) -> bool {
        self.is_air() || self.is_marker()
    }

    /// Classify this block as a trigger fixture, if it is one.
    pub fn mechanism_kind(&self) -> Option<LinkKind> {
        let material = self.material();
        if material == Self::LEVER {
            Some(LinkKind::Lever)
        } else if material.ends_with("_button") {
            Some(LinkKind::Button)
        } else {
            None
        }
    }
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Gate and link kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateType {
    /// Slides straight up by its own height.
    Normal,
    /// Splits at the centre line; each half slides toward its edge.
    DoubleDoor,
    /// Static gate that only changes its logical state.
    Lever,
}

impl GateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateType::Normal => "NORMAL",
            GateType::DoubleDoor => "DOUBLE_DOOR",
            GateType::Lever => "LEVER",
        }
    }
}

impl std::fmt::Display for GateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NORMAL" => Ok(GateType::Normal),
            "DOUBLE_DOOR" => Ok(GateType::DoubleDoor),
            "LEVER" => Ok(GateType::Lever),
            other => Err(format!("unknown gate type: {other}")),
        }
    }
}

/// Kind of trigger fixture bound to a gate.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkKind {
    Lever,
    Button,
    Redstone,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Lever => "LEVER",
            LinkKind::Button => "BUTTON",
            LinkKind::Redstone => "REDSTONE",
        }
    }
}

impl FromStr for LinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LEVER" => Ok(LinkKind::Lever),
            "BUTTON" => Ok(LinkKind::Button),
            "REDSTONE" => Ok(LinkKind::Redstone),
            other => Err(format!("unknown link kind: {other}")),
        }
    }
}

/// A trigger fixture bound to a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismLink {
    pub pos: BlockPos,
    pub kind: LinkKind,
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Whoever asks the engine to do something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: OwnerId,
    /// Holder of elevated rights (may operate any gate).
    #[serde(default)]
    pub is_admin: bool,
}

impl Actor {
    pub fn new(id: OwnerId) -> Self {
        Self { id, is_admin: false }
    }

    pub fn admin(id: OwnerId) -> Self {
        Self { id, is_admin: true }
    }
}

// ---------------------------------------------------------------------------
// Stats & config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStats {
    pub active_gates: usize,
    pub animating_gates: usize,
    pub indexed_positions: usize,
    pub pending_saves: usize,
    pub total_ticks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of ticks a full open or close swing takes.
    pub animation_ticks: u32,
    /// Coalescing window of the deferred save scheduler, in ticks.
    pub save_delay_ticks: u64,
    /// Maximum distance between a mechanism and the gate centre.
    pub link_radius: f64,
    /// Largest box, in cells, a new gate may span.
    pub max_gate_volume: u64,
    /// Simulation tick rate used by the driver.
    pub tick_rate_hz: f32,
    /// SQLite database file used by the server binary.
    pub database_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            animation_ticks: 40,
            save_delay_ticks: 20,
            link_radius: 15.0,
            max_gate_volume: 16_384,
            tick_rate_hz: 20.0,
            database_path: "gates.db".into(),
        }
    }
}
