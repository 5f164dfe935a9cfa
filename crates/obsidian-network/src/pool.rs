//! Concurrent pool of live connections.

use crate::Connection;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe map of address to live connection.
///
/// An address appears at most once. Workers iterate by taking [`keys`]
/// (a point-in-time snapshot), shuffling, then re-looking-up each entry and
/// trying to lease it; entries that vanished or are leased elsewhere are
/// skipped.
///
/// [`keys`]: ConnectionPool::keys
#[derive(Default)]
pub struct ConnectionPool {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection, returning any connection it displaced so the
    /// caller can dispose of it.
    pub fn insert(&self, addr: String, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        self.connections.insert(addr, connection)
    }

    /// Remove a connection. The caller must still hold the connection's
    /// lease, so no other worker is mid-operation on it.
    pub fn remove(&self, addr: &str) -> Option<Arc<Connection>> {
        self.connections.remove(addr).map(|(_, conn)| conn)
    }

    /// Look up a connection.
    pub fn get(&self, addr: &str) -> Option<Arc<Connection>> {
        self.connections.get(addr).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a connection, creating it atomically if absent.
    pub fn get_or_insert_with(
        &self,
        addr: &str,
        make: impl FnOnce() -> Arc<Connection>,
    ) -> Arc<Connection> {
        Arc::clone(
            self.connections
                .entry(addr.to_string())
                .or_insert_with(make)
                .value(),
        )
    }

    /// Whether an address is currently connected.
    pub fn contains(&self, addr: &str) -> bool {
        self.connections.contains_key(addr)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of the connected addresses.
    pub fn keys(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakePeer;

    fn conn() -> Arc<Connection> {
        Arc::new(Connection::new(FakePeer::new().boxed(), false))
    }

    #[test]
    fn test_insert_and_lookup() {
        let pool = ConnectionPool::new();
        assert!(pool.is_empty());

        assert!(pool.insert("10.0.0.1".to_string(), conn()).is_none());
        assert!(pool.contains("10.0.0.1"));
        assert!(pool.get("10.0.0.1").is_some());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_insert_displaces_previous() {
        let pool = ConnectionPool::new();
        let first = conn();
        pool.insert("10.0.0.1".to_string(), Arc::clone(&first));

        let displaced = pool.insert("10.0.0.1".to_string(), conn());
        assert!(Arc::ptr_eq(&displaced.unwrap(), &first));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_remove() {
        let pool = ConnectionPool::new();
        pool.insert("10.0.0.1".to_string(), conn());

        let held = pool.get("10.0.0.1").unwrap();
        let _lease = held.try_acquire().unwrap();
        assert!(pool.remove("10.0.0.1").is_some());
        assert!(!pool.contains("10.0.0.1"));
        assert!(pool.remove("10.0.0.1").is_none());
    }

    #[test]
    fn test_get_or_insert_with() {
        let pool = ConnectionPool::new();

        let created = pool.get_or_insert_with("10.0.0.1", conn);
        let found = pool.get_or_insert_with("10.0.0.1", conn);

        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_keys_snapshot() {
        let pool = ConnectionPool::new();
        pool.insert("10.0.0.1".to_string(), conn());
        pool.insert("10.0.0.2".to_string(), conn());

        let mut keys = pool.keys();
        keys.sort();
        assert_eq!(keys, vec!["10.0.0.1", "10.0.0.2"]);
    }
}
