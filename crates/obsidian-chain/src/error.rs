//! Chain error types.

use thiserror::Error;

/// Errors surfaced by the blockchain engine.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Requested block is not known to the engine.
    #[error("Block not found: {0}")]
    NotFound(String),

    /// Underlying engine failure.
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
