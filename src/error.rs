use crate::types::{BlockPos, GateId};

/// Alias for `Result<T, GateError>`.
pub type GateResult<T> = Result<T, GateError>;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by engine operations.
///
/// Everything except [`GateError::IntegrityViolation`] leaves engine state
/// untouched and may be retried later.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GateError {
    #[error("gate not found: {0}")]
    NotFound(GateId),

    #[error("no gate at {0}")]
    NoGateAt(BlockPos),

    #[error("second corner cannot be the same as the first")]
    SameCorner,

    #[error("gates must be aligned with either the X or Z axis")]
    NotAxisAligned,

    #[error("double doors require even width along the main axis (current width: {width})")]
    OddDoubleDoorWidth { width: i32 },

    #[error("corner {0} lies outside the world's coordinate range")]
    OutOfWorld(BlockPos),

    #[error("gate spans {volume} blocks, the limit is {max}")]
    TooLarge { volume: i64, max: u64 },

    #[error("there's already a gate in this area at {0}")]
    AreaOccupied(BlockPos),

    #[error("no blocks found in the selected region")]
    EmptySelection,

    #[error("captured block {0} lies outside the gate's corners")]
    OutOfBounds(BlockPos),

    #[error("you don't have permission to operate this gate")]
    Unauthorized,

    #[error("the gate is already moving")]
    Busy,

    #[error("something is blocking the gate's path at {0}")]
    Obstructed(BlockPos),

    /// The gate no longer matched its stored fingerprint and was force-removed.
    #[error("gate integrity check failed; corrupted gate {0} was removed")]
    IntegrityViolation(GateId),

    #[error("this mechanism is already linked to the gate")]
    AlreadyLinked,

    #[error("this mechanism is not linked to the gate")]
    NotLinked,

    #[error("only levers and buttons can be linked to gates (nothing linkable at {0})")]
    NotAMechanism(BlockPos),

    #[error("the mechanism is too far from the gate ({distance:.1} > {max:.1})")]
    TooFar { distance: f64, max: f64 },
}

/// Errors raised by a persistence gateway.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed record for gate {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
