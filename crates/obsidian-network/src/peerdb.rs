//! Persistent database of known peer addresses.

use crate::NetworkResult;
use obsidian_storage::{Storage, Table, WriteBatch};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persisted metadata for one known peer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Last successful info exchange, epoch seconds.
    pub lastseen: u64,
    /// Last dial attempt, epoch seconds. Equal to `lastseen` after a
    /// successful attempt; strictly greater after a failed one.
    #[serde(default)]
    pub lastattempt: u64,
    /// Last advertised tip height.
    pub height: u64,
    /// Accumulated misbehavior score.
    pub score: u64,
    /// Last advertised protocol version, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Default for PeerRecord {
    fn default() -> Self {
        Self {
            lastseen: 0,
            lastattempt: 0,
            height: 1,
            score: 0,
            version: None,
        }
    }
}

/// Store of known peers, backed by the `peers` table.
///
/// All writes go through [`WriteBatch`]es so each worker round commits
/// atomically; scans use storage snapshots so they see a stable view
/// independent of concurrent inserts.
pub struct PeerDb {
    store: Arc<dyn Storage>,
}

impl PeerDb {
    /// Wrap a storage handle.
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Seed the database from a bootstrap file, one address per line.
    ///
    /// Addresses already present keep their records; absent ones get the
    /// default record, all inserted in a single batch. A missing file is
    /// only a warning. Returns the number of addresses inserted.
    pub fn bootstrap(&self, path: &Path) -> NetworkResult<usize> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(error) => {
                warn!(path = %path.display(), %error, "Could not open peers file");
                return Ok(0);
            }
        };

        let mut batch = WriteBatch::new();
        let mut inserted = 0;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let addr = line.trim();
            if addr.is_empty() {
                continue;
            }
            if self.get(addr)?.is_none() {
                self.stage(&mut batch, addr, &PeerRecord::default());
                inserted += 1;
            }
        }
        self.commit(batch)?;

        info!(count = inserted, "Seeded peer database");
        Ok(inserted)
    }

    /// Look up a peer record. Entries that fail to decode are treated as
    /// absent.
    pub fn get(&self, addr: &str) -> NetworkResult<Option<PeerRecord>> {
        let Some(bytes) = self.store.get(Table::Peers, addr.as_bytes())? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                warn!(peer = %addr, %error, "Discarding undecodable peer record");
                Ok(None)
            }
        }
    }

    /// Stage a record into a batch.
    pub fn stage(&self, batch: &mut WriteBatch, addr: &str, record: &PeerRecord) {
        match serde_json::to_vec(record) {
            Ok(bytes) => batch.put(Table::Peers, addr.as_bytes(), bytes),
            Err(error) => warn!(peer = %addr, %error, "Could not encode peer record"),
        }
    }

    /// Commit a batch of staged writes atomically.
    pub fn commit(&self, batch: WriteBatch) -> NetworkResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(writes = batch.len(), "Committing peer records");
        self.store.write_batch(batch)?;
        Ok(())
    }

    /// Point-in-time scan of all decodable peer records.
    pub fn snapshot(&self) -> NetworkResult<Vec<(String, PeerRecord)>> {
        let pairs = self.store.snapshot(Table::Peers)?;
        let mut records = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let Ok(addr) = String::from_utf8(key) else {
                continue;
            };
            match serde_json::from_slice(&value) {
                Ok(record) => records.push((addr, record)),
                Err(error) => {
                    warn!(peer = %addr, %error, "Skipping undecodable peer record");
                }
            }
        }
        Ok(records)
    }

}
