//! Typed errors for the storage engine.
//!
//! Physical failures (`Unreachable`, `OpenFailed`, `TransferFailed`, ...) are caught at
//! the smallest scope, one container visit, and turned into skip records. Only
//! [`StockpileError::IndexInconsistency`] and lock poisoning are meant to escape the
//! allocation layer as hard failures.

use thiserror::Error;

use crate::index::types::BlockPos;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, StockpileError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StockpileError {
    /// Requested item is not present in the index.
    #[error("item not found in storage: {0}")]
    NotFound(String),

    /// The agent could not travel to the target.
    #[error("could not reach {location}: {reason}")]
    Unreachable { location: BlockPos, reason: String },

    /// The container was reached but refused to open.
    #[error("failed to open container at {location}: {reason}")]
    OpenFailed { location: BlockPos, reason: String },

    /// The block at this location is not a recognized container.
    #[error("no container at {0}")]
    NotAContainer(BlockPos),

    /// A withdraw or deposit on an open container failed.
    #[error("transfer failed at {location}: {reason}")]
    TransferFailed { location: BlockPos, reason: String },

    /// The delivery recipient is not in the world.
    #[error("player not online: {0}")]
    PlayerOffline(String),

    /// A mutation would break the index invariants. Always a logic error.
    #[error("index inconsistency: {0}")]
    IndexInconsistency(String),

    /// Another physical operation is in flight and the busy policy is `reject`.
    #[error("storage agent is busy with another request")]
    Busy,

    #[error("invalid scan region: {0}")]
    InvalidRegion(String),

    #[error("index lock poisoned")]
    Poisoned,
}

impl StockpileError {
    /// `true` for errors that must propagate past the allocation layer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IndexInconsistency(_) | Self::Poisoned)
    }
}
