//! Test support: scripted peers, transports, and network fixtures.

use crate::peer::{PeerRpc, PeerStats, PeerTransport};
use crate::{Network, NetworkConfig, NetworkError, NetworkResult, PROTOCOL_VERSION};
use obsidian_chain::{Block, MemoryChain, Transaction};
use obsidian_storage::MemoryStore;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct FakePeerInner {
    info: Mutex<Value>,
    blocks: Mutex<Vec<Block>>,
    fail_sends: AtomicBool,
    fail_info: AtomicBool,
    sent_blocks: AtomicUsize,
    sent_transactions: AtomicUsize,
    served_ranges: Mutex<Vec<(u64, u64)>>,
}

/// A scripted peer. Clones share state, so a test can keep a handle for
/// inspection after boxing the RPC side into a connection.
#[derive(Clone)]
pub(crate) struct FakePeer {
    inner: Arc<FakePeerInner>,
}

impl FakePeer {
    pub(crate) fn new() -> Self {
        let peer = Self {
            inner: Arc::new(FakePeerInner::default()),
        };
        peer.set_info(json!({
            "version": PROTOCOL_VERSION,
            "tipHeight": 1,
            "peers": [],
        }));
        peer
    }

    /// Script the info payload from its typical fields.
    pub(crate) fn reporting(self, version: &str, tip_height: u64, peers: &[&str]) -> Self {
        self.set_info(json!({
            "version": version,
            "tipHeight": tip_height,
            "peers": peers,
        }));
        self
    }

    /// Script a raw info payload.
    pub(crate) fn with_info(self, value: Value) -> Self {
        self.set_info(value);
        self
    }

    /// Script the chain this peer serves.
    pub(crate) fn with_blocks(self, blocks: &[Block]) -> Self {
        *self.inner.blocks.lock() = blocks.to_vec();
        self
    }

    /// Make send RPCs fail with a transport error.
    pub(crate) fn failing_sends(self) -> Self {
        self.inner.fail_sends.store(true, Ordering::SeqCst);
        self
    }

    /// Make `get_info` fail with a transport error.
    pub(crate) fn failing_info(self) -> Self {
        self.inner.fail_info.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn set_info(&self, value: Value) {
        *self.inner.info.lock() = value;
    }

    /// The RPC side, for handing to a `Connection`.
    pub(crate) fn boxed(&self) -> Box<dyn PeerRpc + Send> {
        Box::new(FakeRpc {
            inner: Arc::clone(&self.inner),
        })
    }

    pub(crate) fn sent_blocks(&self) -> usize {
        self.inner.sent_blocks.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_transactions(&self) -> usize {
        self.inner.sent_transactions.load(Ordering::SeqCst)
    }

    /// The `get_blocks` ranges served so far, in call order.
    pub(crate) fn served_ranges(&self) -> Vec<(u64, u64)> {
        self.inner.served_ranges.lock().clone()
    }
}

struct FakeRpc {
    inner: Arc<FakePeerInner>,
}

impl PeerRpc for FakeRpc {
    fn get_info(&mut self) -> NetworkResult<Value> {
        if self.inner.fail_info.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("connection reset".to_string()));
        }
        Ok(self.inner.info.lock().clone())
    }

    fn send_transactions(&mut self, transactions: &[Transaction]) -> NetworkResult<()> {
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("connection reset".to_string()));
        }
        self.inner
            .sent_transactions
            .fetch_add(transactions.len().max(1), Ordering::SeqCst);
        Ok(())
    }

    fn send_block(&mut self, _block: &Block) -> NetworkResult<()> {
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("connection reset".to_string()));
        }
        self.inner.sent_blocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unconfirmed_transactions(&mut self) -> NetworkResult<Vec<Transaction>> {
        Ok(Vec::new())
    }

    fn get_block(&mut self, height: u64, id: &str) -> NetworkResult<Block> {
        self.inner
            .blocks
            .lock()
            .iter()
            .find(|b| b.height == height && b.id == id)
            .cloned()
            .ok_or_else(|| NetworkError::Transport("unknown block".to_string()))
    }

    fn get_blocks(&mut self, start: u64, end: u64) -> NetworkResult<Vec<Block>> {
        self.inner.served_ranges.lock().push((start, end));
        let mut window: Vec<Block> = self
            .inner
            .blocks
            .lock()
            .iter()
            .filter(|b| b.height >= start && b.height <= end)
            .cloned()
            .collect();
        window.sort_by_key(|b| b.height);
        Ok(window)
    }

    fn peer_stats(&mut self) -> NetworkResult<PeerStats> {
        Ok(PeerStats {
            bytes_received: 1024,
            bytes_sent: 512,
            latency_ms: 15,
            ..PeerStats::default()
        })
    }
}

/// A transport whose dial and accept results are scripted per test.
#[derive(Default)]
pub(crate) struct FakeTransport {
    dials: Mutex<HashMap<String, VecDeque<FakePeer>>>,
    accepts: Mutex<VecDeque<FakePeer>>,
}

impl FakeTransport {
    pub(crate) fn on_dial(&self, addr: &str, peer: FakePeer) {
        self.dials
            .lock()
            .entry(addr.to_string())
            .or_default()
            .push_back(peer);
    }

    pub(crate) fn on_accept(&self, peer: FakePeer) {
        self.accepts.lock().push_back(peer);
    }
}

impl PeerTransport for FakeTransport {
    fn dial(
        &self,
        addr: IpAddr,
        _port: u16,
        _timeout: Duration,
    ) -> NetworkResult<Box<dyn PeerRpc + Send>> {
        self.dials
            .lock()
            .get_mut(&addr.to_string())
            .and_then(VecDeque::pop_front)
            .map(|peer| peer.boxed())
            .ok_or_else(|| NetworkError::Transport("connection refused".to_string()))
    }

    fn accept(&self, _stream: TcpStream, _addr: IpAddr) -> NetworkResult<Box<dyn PeerRpc + Send>> {
        self.accepts
            .lock()
            .pop_front()
            .map(|peer| peer.boxed())
            .ok_or_else(|| NetworkError::Transport("handshake failed".to_string()))
    }
}

/// A linear chain `b1..bn`, heights `1..=n`.
pub(crate) fn make_blocks(n: u64) -> Vec<Block> {
    (1..=n)
        .map(|height| Block {
            id: format!("b{height}"),
            previous_id: if height == 1 {
                String::new()
            } else {
                format!("b{}", height - 1)
            },
            height,
            timestamp: 1_700_000_000 + height,
            transactions: Vec::new(),
        })
        .collect()
}

/// A side chain `f{from}..f{to}` branching off `parent`.
pub(crate) fn fork_blocks(parent: &str, from: u64, to: u64) -> Vec<Block> {
    (from..=to)
        .map(|height| Block {
            id: format!("f{height}"),
            previous_id: if height == from {
                parent.to_string()
            } else {
                format!("f{}", height - 1)
            },
            height,
            timestamp: 1_700_000_000 + height,
            transactions: Vec::new(),
        })
        .collect()
}

/// Insert a scripted peer into the pool as an outbound connection with the
/// given advertised height, returning the inspection handle.
pub(crate) fn pooled_peer(
    state: &Arc<crate::service::NetworkState>,
    addr: &str,
    blocks: &[Block],
    height: u64,
) -> FakePeer {
    let peer = FakePeer::new()
        .with_blocks(blocks)
        .reporting(PROTOCOL_VERSION, height, &[]);
    let connection = Arc::new(crate::Connection::new(peer.boxed(), false));
    connection.set_height(height);
    state.pool.insert(addr.to_string(), connection);
    peer
}

pub(crate) fn test_config() -> NetworkConfig {
    NetworkConfig {
        port: 0,
        seed_file: PathBuf::from("/nonexistent/peers.txt"),
        declared_address: None,
        target_connections: 8,
    }
}

/// A network over an in-memory chain holding only `b1`.
pub(crate) fn test_network() -> Network {
    test_network_with(Arc::new(MemoryChain::new(make_blocks(1).remove(0))))
}

pub(crate) fn test_network_with(chain: Arc<MemoryChain>) -> Network {
    test_network_parts(chain, Arc::new(FakeTransport::default()))
}

pub(crate) fn test_network_parts(
    chain: Arc<MemoryChain>,
    transport: Arc<FakeTransport>,
) -> Network {
    Network::new(
        test_config(),
        chain,
        transport,
        Arc::new(MemoryStore::new()),
    )
    .expect("test network")
}

/// A connected socket pair; the accept-side stream comes first.
pub(crate) fn stream_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (server, client)
}
