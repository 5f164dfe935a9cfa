//! # obsidian-network
//!
//! P2P networking layer for the Obsidian node.
//!
//! This crate provides:
//! - A persistent database of known peer addresses
//! - Concurrent inbound and outbound connection management
//! - Chain synchronization against connected peers
//! - Transaction and block broadcast
//! - Misbehavior scoring with temporary bans
//!
//! The wire protocol and the blockchain engine are supplied by the host
//! through the [`PeerTransport`] and [`obsidian_chain::Blockchain`] traits;
//! everything else runs on four worker threads owned by [`Network`].

mod acceptor;
mod bans;
mod config;
mod connection;
mod dialer;
mod error;
mod peer;
mod peerdb;
mod poller;
mod pool;
mod score;
mod service;
mod sync;

#[cfg(test)]
mod testutil;

pub use bans::{BanList, BAN_DURATION_SECS};
pub use config::NetworkConfig;
pub use connection::{CachedInfo, Connection, Lease};
pub use error::{NetworkError, NetworkResult};
pub use peer::{PeerRpc, PeerStats, PeerTransport, RemoteInfo};
pub use peerdb::{PeerDb, PeerRecord};
pub use pool::ConnectionPool;
pub use score::{Penalties, BAN_SCORE_THRESHOLD};
pub use service::Network;

/// Default P2P port.
pub const DEFAULT_PORT: u16 = 9330;

/// Protocol version advertised to peers. Peers whose major version differs
/// are disconnected.
pub const PROTOCOL_VERSION: &str = "1.4.0";

/// Current time as epoch seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
