//! Inbound connection worker.

use crate::connection::{CachedInfo, Connection};
use crate::peer::RemoteInfo;
use crate::peerdb::PeerRecord;
use crate::service::NetworkState;
use crate::{unix_now, NetworkResult};
use obsidian_storage::WriteBatch;
use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bound on the accept poll, so shutdown is observed promptly.
const ACCEPT_WAIT: Duration = Duration::from_secs(2);

pub(crate) fn run(state: Arc<NetworkState>, listener: TcpListener) {
    while state.running() {
        match listener.accept() {
            Ok((stream, remote)) => admit(&state, stream, remote.ip()),
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                state.idle(ACCEPT_WAIT);
            }
            Err(error) => {
                warn!(%error, "Accept failed");
                state.idle(ACCEPT_WAIT);
            }
        }
    }
}

/// Vet an accepted stream and, if it passes, register the peer.
///
/// Dropping the stream disconnects a rejected peer.
pub(crate) fn admit(state: &NetworkState, stream: TcpStream, ip: IpAddr) {
    let addr = ip.to_string();

    if state.pool.contains(&addr) {
        info!(peer = %addr, "Incoming connection duplicates an existing connection");
        return;
    }
    if state.bans.is_banned(&addr, unix_now()) {
        info!(peer = %addr, "Incoming connection is banned");
        return;
    }
    if state.is_self_address(ip) {
        info!(peer = %addr, "Incoming connection is connecting to self");
        return;
    }

    info!(peer = %addr, "Peer connected");
    if let Err(error) = register(state, stream, ip, &addr) {
        warn!(peer = %addr, %error, "Failed to get information from connecting peer");
    }
}

fn register(state: &NetworkState, stream: TcpStream, ip: IpAddr, addr: &str) -> NetworkResult<()> {
    let rpc = state.transport.accept(stream, ip)?;
    let connection = Arc::new(Connection::new(rpc, true));

    // Freshly built, so the lease is uncontended; holding it for the whole
    // handshake keeps other workers off the connection until it is usable.
    let _lease = connection.try_acquire();

    let value = connection.get_info()?;
    let remote = RemoteInfo::from_value(&value)?;

    let record = PeerRecord {
        lastseen: unix_now(),
        lastattempt: 0,
        height: remote.tip_height,
        score: 0,
        version: Some(remote.version),
    };
    connection.set_cached(CachedInfo {
        record: record.clone(),
        disconnect: false,
    });

    state.pool.insert(addr.to_string(), Arc::clone(&connection));

    let mut batch = WriteBatch::new();
    state.peers.stage(&mut batch, addr, &record);
    state.peers.commit(batch)?;

    Ok(())
}
