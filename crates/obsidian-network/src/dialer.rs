//! Outbound connection worker.

use crate::connection::{CachedInfo, Connection};
use crate::service::NetworkState;
use crate::unix_now;
use obsidian_storage::WriteBatch;
use rand::seq::SliceRandom;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Delay between scans while below the connection target.
const DIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Delay once the connection target is met.
const DIAL_BACKOFF: Duration = Duration::from_secs(20);

/// Outbound connect timeout.
const DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// How long to leave a recently failed peer alone.
const ATTEMPT_COOLDOWN_SECS: u64 = 5 * 60;

pub(crate) fn run(state: Arc<NetworkState>) {
    while state.running() {
        let satisfied = dial_round(&state);
        state.idle(if satisfied { DIAL_BACKOFF } else { DIAL_INTERVAL });
    }
}

/// Scan the peer database and dial eligible candidates.
///
/// Returns true when the connection target is already met, in which case
/// the caller backs off instead of rescanning immediately.
pub(crate) fn dial_round(state: &NetworkState) -> bool {
    let snapshot = match state.peers.snapshot() {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(%error, "Could not scan the peer database");
            return false;
        }
    };

    let now = unix_now();
    let mut candidates = Vec::new();
    for (addr, record) in snapshot {
        if state.pool.len() >= state.config.target_connections {
            return true;
        }
        if state.pool.contains(&addr) {
            continue;
        }
        if state.bans.is_banned(&addr, now) {
            continue;
        }
        // A successful attempt leaves lastattempt == lastseen; the
        // inequality singles out recently *failed* attempts, so known-good
        // peers may be retried immediately.
        if record.lastattempt + ATTEMPT_COOLDOWN_SECS > now
            && record.lastattempt != record.lastseen
        {
            continue;
        }
        let Ok(ip) = addr.parse::<IpAddr>() else {
            continue;
        };
        if state.is_self_address(ip) {
            continue;
        }
        candidates.push((addr, ip, record));
    }

    candidates.shuffle(&mut *state.rng.lock());

    let mut batch = WriteBatch::new();
    for (addr, ip, mut record) in candidates {
        if !state.running() {
            break;
        }

        info!(peer = %addr, "Attempting to connect");
        record.lastattempt = unix_now();

        match state.transport.dial(ip, state.config.port, DIAL_TIMEOUT) {
            Ok(rpc) => {
                info!(peer = %addr, "Successfully connected");
                record.lastseen = record.lastattempt;
                record.score = 0;

                let connection = Arc::new(Connection::new(rpc, false));
                connection.set_cached(CachedInfo {
                    record: record.clone(),
                    disconnect: false,
                });
                state.pool.insert(addr.clone(), connection);
            }
            Err(error) => {
                warn!(peer = %addr, %error, "Failed to connect");
            }
        }

        state.peers.stage(&mut batch, &addr, &record);
    }

    if let Err(error) = state.peers.commit(batch) {
        warn!(%error, "Could not record dial attempts");
    }
    false
}
