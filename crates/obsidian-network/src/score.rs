//! Misbehavior scoring.
//!
//! Penalties accumulate in a connection's cached info. Crossing the ban
//! threshold inserts a 24-hour ban and raises the advisory disconnect
//! flag; the score itself is flushed to the peer database when the
//! connection is torn down.

use crate::{unix_now, BanList, ConnectionPool};
use tracing::warn;

/// Score above which an address is banned.
pub const BAN_SCORE_THRESHOLD: u64 = 200;

/// Penalty amounts for peer misbehaviors.
pub struct Penalties;

impl Penalties {
    /// Advertised a peer address that does not parse.
    pub const MALFORMED_PEER_ADDRESS: u64 = 10;

    /// Submitted block was rejected by the engine.
    pub const REJECTED_BLOCK: u64 = 25;

    /// Info payload violated the schema.
    pub const MALFORMED_INFO: u64 = 50;

    /// Served a provably invalid block.
    pub const INVALID_BLOCK: u64 = 50;

    /// Served a chain with a different genesis than ours.
    pub const GENESIS_MISMATCH: u64 = 250;
}

/// Apply a penalty to a connected peer.
///
/// No-op when the address is not in the pool. Shared by the info poller
/// and the synchronizer, so threshold decisions are consistent across
/// workers.
pub(crate) fn change_score(pool: &ConnectionPool, bans: &BanList, addr: &str, delta: u64) {
    let Some(connection) = pool.get(addr) else {
        return;
    };

    let score = connection.add_score(delta);
    warn!(peer = %addr, delta, score, "Peer misbehaving, increasing ban score");

    if score > BAN_SCORE_THRESHOLD {
        warn!(peer = %addr, score, "Banning peer for exceeding the ban score threshold");
        bans.ban(addr, unix_now());
        connection.request_disconnect();
    }
}
