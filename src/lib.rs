//! Drawbridge Gate Engine
//!
//! Animated, collision-safe gates inside a shared, mutable voxel world.
//! A gate is a flat block assembly that swings between a closed and an
//! open footprint, toggled directly or through linked levers and buttons.
//!
//! ## Architecture
//!
//! ```text
//! GateDriver  (driver.rs)          ← tick loop + JSON-lines requests
//!   └── GateEngine  (engine.rs)    ← owns all gate state
//!         ├── GateRegistry   (gate.rs)        ← active gates
//!         ├── SpatialIndex   (index.rs)       ← block → gate
//!         ├── Animation      (animation.rs)   ← per-gate swing
//!         │     └── Geometry (geometry.rs) + obstruction.rs
//!         ├── SaveScheduler  (scheduler.rs)   ← deferred writes
//!         ├── MechanismLinks (links.rs)       ← levers / buttons
//!         ├── integrity.rs                    ← tamper detection
//!         ├── dyn GateStore  (store.rs)       ← SQLite / memory
//!         └── dyn BlockWorld (world.rs)       ← the voxel world
//! ```
//!
//! The engine is single-threaded by construction: every read and write of
//! gate state happens inside a `&mut GateEngine` call, and a swing spans
//! ticks rather than blocking a thread.

// Engine modules are always available (no server feature needed).
pub mod animation;
pub mod engine;
pub mod error;
pub mod gate;
pub mod geometry;
pub mod index;
pub mod integrity;
pub mod links;
pub mod obstruction;
pub mod protocol;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod world;

// The async driver requires the `server` feature.
#[cfg(feature = "server")]
pub mod driver;

// Convenience re-exports
#[cfg(feature = "server")]
pub use driver::GateDriver;
pub use engine::{AccessPolicy, GateEngine, OwnerPolicy};
pub use error::{GateError, GateResult, StoreError, StoreResult};
pub use gate::{Gate, GateState};
pub use geometry::{Axis, Bounds, Geometry};
pub use store::{GateStore, MemoryGateStore, SqliteGateStore};
pub use types::{
    Actor, BlockPos, BlockState, EngineConfig, EngineStats, GateId, GateType, LinkKind,
    MechanismLink, Vec3,
};
pub use world::{BlockWorld, MemoryWorld};
