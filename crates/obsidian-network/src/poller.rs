//! Info polling worker.
//!
//! Periodically exchanges info with every reachable peer: verifies
//! compatibility, refreshes cached metadata and outward statistics, and
//! harvests advertised peer addresses into the database. Any per-peer
//! failure flushes the peer's cached record and removes the connection.

use crate::peer::{major_version, RemoteInfo};
use crate::peerdb::PeerRecord;
use crate::score::Penalties;
use crate::service::NetworkState;
use crate::{unix_now, NetworkError, NetworkResult, PROTOCOL_VERSION};
use obsidian_storage::WriteBatch;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Delay between polling passes.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub(crate) fn run(state: Arc<NetworkState>) {
    while state.running() {
        poll_round(&state);
        state.idle(POLL_INTERVAL);
    }
}

/// One shuffled pass over the pool.
///
/// All record writes from the pass commit in a single batch.
pub(crate) fn poll_round(state: &NetworkState) {
    let mut batch = WriteBatch::new();

    for key in state.shuffled_keys() {
        let Some(connection) = state.pool.get(&key) else {
            continue;
        };
        let Some(_lease) = connection.try_acquire() else {
            continue;
        };

        if let Err(error) = refresh(state, &key, &connection, &mut batch) {
            warn!(peer = %key, %error, "Disconnecting peer");
            // Flush the cached record before the entry goes away, so the
            // database reflects the last successful exchange.
            state.peers.stage(&mut batch, &key, &connection.cached().record);
            state.stats.remove(&key);
            state.pool.remove(&key);
        }
    }

    if let Err(error) = state.peers.commit(batch) {
        warn!(%error, "Could not persist peer records");
    }
}

fn refresh(
    state: &NetworkState,
    addr: &str,
    connection: &crate::Connection,
    batch: &mut WriteBatch,
) -> NetworkResult<()> {
    if connection.disconnect_requested() {
        return Err(NetworkError::DisconnectRequested);
    }

    let value = connection.get_info()?;
    let remote = match RemoteInfo::from_value(&value) {
        Ok(remote) => remote,
        Err(error) => {
            state.change_score(addr, Penalties::MALFORMED_INFO);
            return Err(error);
        }
    };

    if major_version(&remote.version) != major_version(PROTOCOL_VERSION) {
        warn!(peer = %addr, version = %remote.version, "Peer has a different major version than us");
        return Err(NetworkError::IncompatibleVersion {
            ours: PROTOCOL_VERSION.to_string(),
            theirs: remote.version,
        });
    }

    if state.bans.is_banned(addr, unix_now()) {
        return Err(NetworkError::Banned);
    }

    connection.set_version(remote.version.clone());
    connection.set_height(remote.tip_height);

    let mut stats = connection.peer_stats()?;
    stats.version = remote.version;
    stats.height = remote.tip_height;
    state.stats.insert(addr.to_string(), stats);

    for advertised in &remote.peers {
        match advertised.parse::<IpAddr>() {
            Ok(ip) => {
                let candidate = ip.to_string();
                if state.peers.get(&candidate)?.is_none() {
                    info!(peer = %candidate, "Discovered new peer");
                    state.peers.stage(batch, &candidate, &PeerRecord::default());
                }
            }
            Err(_) => {
                state.change_score(addr, Penalties::MALFORMED_PEER_ADDRESS);
                return Err(NetworkError::MalformedInfo(format!(
                    "malformed peer address {advertised:?}"
                )));
            }
        }
    }

    connection.set_lastseen(unix_now());
    state.peers.stage(batch, addr, &connection.cached().record);

    Ok(())
}
