//! A live connection to one peer.
//!
//! Each connection carries three independent locks:
//!
//! - the *modification* lock serializing RPC calls on the peer handle,
//! - the *info* lock guarding the cached peer metadata,
//! - the *lease* lock reserving the connection for one worker's multi-step
//!   operation, taken non-blockingly via [`Connection::try_acquire`].
//!
//! Lock order is lease, then modification, then info; the info lock may
//! also be taken on its own, so stats readers never wait on in-flight RPC.

use crate::peer::{PeerRpc, PeerStats};
use crate::peerdb::PeerRecord;
use crate::NetworkResult;
use obsidian_chain::{Block, Transaction};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;

/// Cached metadata for a connection.
///
/// Mirrors the persisted peer record, plus the advisory disconnect flag.
/// The record portion is flushed back to the peer database when the
/// connection is torn down.
#[derive(Debug, Clone, Default)]
pub struct CachedInfo {
    /// Peer metadata as it will be persisted.
    pub record: PeerRecord,
    /// Set when a worker has decided the peer must be disconnected; the
    /// info poller honors it on its next pass.
    pub disconnect: bool,
}

/// Exclusive reservation of a connection.
///
/// Dropping the lease releases the reservation, so release is guaranteed
/// on every exit path.
pub struct Lease<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// A connection to one remote peer.
pub struct Connection {
    rpc: Mutex<Box<dyn PeerRpc + Send>>,
    info: Mutex<CachedInfo>,
    lease: Mutex<()>,
    inbound: bool,
}

impl Connection {
    /// Wrap a peer handle produced by the transport.
    pub fn new(rpc: Box<dyn PeerRpc + Send>, inbound: bool) -> Self {
        Self {
            rpc: Mutex::new(rpc),
            info: Mutex::new(CachedInfo::default()),
            lease: Mutex::new(()),
            inbound,
        }
    }

    /// Whether the peer connected to us.
    pub fn is_inbound(&self) -> bool {
        self.inbound
    }

    /// Try to reserve this connection for a multi-step operation.
    ///
    /// Non-blocking: returns `None` if another worker holds the lease, in
    /// which case the caller skips this peer for the current round.
    pub fn try_acquire(&self) -> Option<Lease<'_>> {
        self.lease.try_lock().map(|guard| Lease { _guard: guard })
    }

    // RPC surface. One request in flight per connection.

    /// Fetch the peer's self-description.
    pub fn get_info(&self) -> NetworkResult<Value> {
        self.rpc.lock().get_info()
    }

    /// Relay transactions to the peer.
    pub fn send_transactions(&self, transactions: &[Transaction]) -> NetworkResult<()> {
        self.rpc.lock().send_transactions(transactions)
    }

    /// Relay a block to the peer.
    pub fn send_block(&self, block: &Block) -> NetworkResult<()> {
        self.rpc.lock().send_block(block)
    }

    /// Fetch the peer's unconfirmed transactions.
    pub fn unconfirmed_transactions(&self) -> NetworkResult<Vec<Transaction>> {
        self.rpc.lock().unconfirmed_transactions()
    }

    /// Fetch a single block by height and id.
    pub fn get_block(&self, height: u64, id: &str) -> NetworkResult<Block> {
        self.rpc.lock().get_block(height, id)
    }

    /// Fetch the blocks with heights in `start..=end`.
    pub fn get_blocks(&self, start: u64, end: u64) -> NetworkResult<Vec<Block>> {
        self.rpc.lock().get_blocks(start, end)
    }

    /// Fetch transport statistics for this peer.
    pub fn peer_stats(&self) -> NetworkResult<PeerStats> {
        self.rpc.lock().peer_stats()
    }

    // Cached info accessors.

    /// Snapshot the cached info.
    pub fn cached(&self) -> CachedInfo {
        self.info.lock().clone()
    }

    /// Replace the cached info wholesale.
    pub fn set_cached(&self, cached: CachedInfo) {
        *self.info.lock() = cached;
    }

    /// The peer's last advertised tip height.
    pub fn height(&self) -> u64 {
        self.info.lock().record.height
    }

    /// Update the cached tip height.
    pub fn set_height(&self, height: u64) {
        self.info.lock().record.height = height;
    }

    /// Update the cached protocol version.
    pub fn set_version(&self, version: String) {
        self.info.lock().record.version = Some(version);
    }

    /// Update the cached last-seen time.
    pub fn set_lastseen(&self, lastseen: u64) {
        self.info.lock().record.lastseen = lastseen;
    }

    /// The peer's accumulated misbehavior score.
    pub fn score(&self) -> u64 {
        self.info.lock().record.score
    }

    /// Add to the misbehavior score and return the new total.
    pub fn add_score(&self, delta: u64) -> u64 {
        let mut info = self.info.lock();
        info.record.score = info.record.score.saturating_add(delta);
        info.record.score
    }

    /// Ask the owning worker to tear this connection down.
    pub fn request_disconnect(&self) {
        self.info.lock().disconnect = true;
    }

    /// Whether teardown has been requested.
    pub fn disconnect_requested(&self) -> bool {
        self.info.lock().disconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakePeer;

    #[test]
    fn test_lease_is_exclusive() {
        let conn = Connection::new(FakePeer::new().boxed(), false);

        let lease = conn.try_acquire();
        assert!(lease.is_some());
        assert!(conn.try_acquire().is_none());

        drop(lease);
        assert!(conn.try_acquire().is_some());
    }

    #[test]
    fn test_cached_info_accessors() {
        let conn = Connection::new(FakePeer::new().boxed(), true);
        assert!(conn.is_inbound());
        assert_eq!(conn.height(), 1);

        conn.set_height(17);
        conn.set_version("1.4.0".to_string());
        conn.set_lastseen(1000);

        let cached = conn.cached();
        assert_eq!(cached.record.height, 17);
        assert_eq!(cached.record.version.as_deref(), Some("1.4.0"));
        assert_eq!(cached.record.lastseen, 1000);
        assert!(!cached.disconnect);

        assert_eq!(conn.add_score(30), 30);
        assert_eq!(conn.add_score(25), 55);

        conn.request_disconnect();
        assert!(conn.disconnect_requested());
    }
}
