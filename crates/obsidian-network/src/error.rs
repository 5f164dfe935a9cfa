//! Network error types.

use thiserror::Error;

/// Network errors.
///
/// Per-peer failures are always handled locally by disconnecting the peer;
/// none of them escape the worker loops or the broadcast API.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Transport failure: connection loss, timeout, or a response the wire
    /// layer could not decode.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Schema violation in a peer's info payload.
    #[error("Malformed info: {0}")]
    MalformedInfo(String),

    /// Peer is banned.
    #[error("Peer is banned")]
    Banned,

    /// Peer runs an incompatible protocol major version.
    #[error("Incompatible major version: ours {ours}, theirs {theirs}")]
    IncompatibleVersion { ours: String, theirs: String },

    /// Teardown was requested via the advisory disconnect flag.
    #[error("Disconnect requested")]
    DisconnectRequested,

    /// Entropy source failure while seeding connection randomness.
    #[error("Could not seed connection randomness")]
    EntropyUnavailable,

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] obsidian_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
