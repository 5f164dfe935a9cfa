//! Network service owning the worker threads.

use crate::peer::{PeerStats, PeerTransport};
use crate::{
    acceptor, dialer, poller, score, sync, BanList, ConnectionPool, NetworkConfig, NetworkError,
    NetworkResult, PeerDb,
};
use dashmap::DashMap;
use obsidian_chain::{Block, Blockchain, Transaction};
use obsidian_storage::Storage;
use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// State shared by all workers.
pub(crate) struct NetworkState {
    pub(crate) config: NetworkConfig,
    pub(crate) pool: ConnectionPool,
    pub(crate) bans: BanList,
    pub(crate) peers: PeerDb,
    pub(crate) chain: Arc<dyn Blockchain>,
    pub(crate) transport: Arc<dyn PeerTransport>,
    /// Outward per-peer statistics, refreshed by the info poller.
    pub(crate) stats: DashMap<String, PeerStats>,
    /// Shared shuffle source, seeded once at construction.
    pub(crate) rng: Mutex<StdRng>,
    pub(crate) running: AtomicBool,
    /// Our local tip height as the synchronizer last observed it.
    pub(crate) current_height: AtomicU64,
    /// Best height advertised by us or any connected peer.
    pub(crate) best_height: AtomicU64,
}

impl NetworkState {
    pub(crate) fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pool addresses in randomized order. Randomization breaks ties
    /// fairly so later peers are not starved.
    pub(crate) fn shuffled_keys(&self) -> Vec<String> {
        let mut keys = self.pool.keys();
        keys.shuffle(&mut *self.rng.lock());
        keys
    }

    /// Whether an address would loop back to this node.
    pub(crate) fn is_self_address(&self, addr: IpAddr) -> bool {
        addr.is_loopback()
            || addr.is_unspecified()
            || self.config.declared_address == Some(addr)
    }

    pub(crate) fn change_score(&self, addr: &str, delta: u64) {
        score::change_score(&self.pool, &self.bans, addr, delta);
    }

    /// Sleep for `duration`, waking early on shutdown.
    pub(crate) fn idle(&self, duration: Duration) {
        let mut remaining = duration;
        let slice = Duration::from_millis(100);
        while self.running() && remaining > Duration::ZERO {
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}

/// The networking core of the node.
///
/// Construction seeds randomness, loads the bootstrap peers, and binds the
/// listener; [`start`](Network::start) launches the acceptor, dialer, info
/// poller, and synchronizer threads. [`shutdown`](Network::shutdown) (also
/// run on drop) stops and joins them all.
pub struct Network {
    state: Arc<NetworkState>,
    listener: Mutex<Option<TcpListener>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Network {
    /// Build the networking core.
    ///
    /// Fails only if the entropy source cannot seed the shuffle randomness
    /// or the peer database cannot be read. A listener bind failure is
    /// logged and disables inbound connections.
    pub fn new(
        config: NetworkConfig,
        chain: Arc<dyn Blockchain>,
        transport: Arc<dyn PeerTransport>,
        store: Arc<dyn Storage>,
    ) -> NetworkResult<Self> {
        let peers = PeerDb::new(store);
        peers.bootstrap(&config.seed_file)?;

        let rng = seed_rng()?;

        let listener = match TcpListener::bind(("0.0.0.0", config.port)) {
            Ok(listener) => {
                listener.set_nonblocking(true)?;
                info!(port = config.port, "Listening for peers");
                Some(listener)
            }
            Err(error) => {
                error!(port = config.port, %error, "Could not bind to port");
                None
            }
        };

        let state = Arc::new(NetworkState {
            config,
            pool: ConnectionPool::new(),
            bans: BanList::new(),
            peers,
            chain,
            transport,
            stats: DashMap::new(),
            rng: Mutex::new(rng),
            running: AtomicBool::new(true),
            current_height: AtomicU64::new(0),
            best_height: AtomicU64::new(0),
        });

        Ok(Self {
            state,
            listener: Mutex::new(listener),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Launch the worker threads.
    pub fn start(&self) -> NetworkResult<()> {
        let mut workers = self.workers.lock();

        if let Some(listener) = self.listener.lock().take() {
            let state = Arc::clone(&self.state);
            workers.push(
                std::thread::Builder::new()
                    .name("net-acceptor".to_string())
                    .spawn(move || acceptor::run(state, listener))?,
            );
        }

        for (name, worker) in [
            ("net-dialer", dialer::run as fn(Arc<NetworkState>)),
            ("net-poller", poller::run as fn(Arc<NetworkState>)),
            ("net-sync", sync::run as fn(Arc<NetworkState>)),
        ] {
            let state = Arc::clone(&self.state);
            workers.push(
                std::thread::Builder::new()
                    .name(name.to_string())
                    .spawn(move || worker(state))?,
            );
        }

        Ok(())
    }

    /// Stop and join all workers. Idempotent.
    pub fn shutdown(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }

    /// Number of live connections.
    pub fn connections(&self) -> usize {
        self.state.pool.len()
    }

    /// Addresses of the currently connected peers.
    pub fn connected_peers(&self) -> BTreeSet<String> {
        self.state.pool.keys().into_iter().collect()
    }

    /// Our local tip height as the synchronizer last observed it.
    pub fn current_height(&self) -> u64 {
        self.state.current_height.load(Ordering::SeqCst)
    }

    /// Best height advertised by us or any connected peer.
    pub fn best_height(&self) -> u64 {
        self.state.best_height.load(Ordering::SeqCst)
    }

    /// Fraction of the best known chain we hold locally, in `0.0..=1.0`.
    pub fn sync_progress(&self) -> f64 {
        let best = self.best_height();
        if best == 0 {
            return 1.0;
        }
        (self.current_height() as f64 / best as f64).min(1.0)
    }

    /// Per-peer transport statistics.
    pub fn peer_stats(&self) -> HashMap<String, PeerStats> {
        self.state
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Apply a misbehavior penalty to a connected peer.
    pub fn change_score(&self, addr: &str, delta: u64) {
        self.state.change_score(addr, delta);
    }

    /// Relay transactions to every reachable peer.
    ///
    /// Per-peer transport failures are logged; the broadcast itself never
    /// fails.
    pub fn broadcast_transactions(&self, transactions: &[Transaction]) {
        for key in self.state.shuffled_keys() {
            let Some(connection) = self.state.pool.get(&key) else {
                continue;
            };
            let Some(_lease) = connection.try_acquire() else {
                continue;
            };
            if let Err(error) = connection.send_transactions(transactions) {
                warn!(peer = %key, %error, "Failed to relay transactions to peer");
            }
        }
    }

    /// Relay a block to every reachable peer.
    pub fn broadcast_block(&self, block: &Block) {
        for key in self.state.shuffled_keys() {
            let Some(connection) = self.state.pool.get(&key) else {
                continue;
            };
            let Some(_lease) = connection.try_acquire() else {
                continue;
            };
            if let Err(error) = connection.send_block(block) {
                warn!(peer = %key, %error, "Failed to relay block to peer");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Arc<NetworkState> {
        &self.state
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Seed the shuffle PRNG from 64 bytes of OS entropy folded to 64 bits.
fn seed_rng() -> NetworkResult<StdRng> {
    let mut entropy = [0u8; 64];
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|_| NetworkError::EntropyUnavailable)?;

    let mut seed = 0u64;
    for word in entropy.chunks_exact(8) {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(word);
        seed ^= u64::from_le_bytes(bytes);
    }

    Ok(StdRng::seed_from_u64(seed))
}
