//! In-memory storage implementation.
//!
//! Backs the `Storage` trait with plain maps so higher layers can be
//! exercised in tests without touching disk.

use crate::batch::OperationKind;
use crate::{Storage, StorageResult, Table, WriteBatch};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// In-memory `Storage` implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Table, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let tables = self.tables.read();
        Ok(tables.get(&table).and_then(|t| t.get(key).cloned()))
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut tables = self.tables.write();
        tables
            .entry(table)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: Table, key: &[u8]) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if let Some(t) = tables.get_mut(&table) {
            t.remove(key);
        }
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        // Single write lock for the whole batch keeps it atomic to readers.
        let mut tables = self.tables.write();
        for op in batch.operations {
            let t = tables.entry(op.table).or_default();
            match op.kind {
                OperationKind::Put { value } => {
                    t.insert(op.key, value);
                }
                OperationKind::Delete => {
                    t.remove(&op.key);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self, table: Table) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let tables = self.tables.read();
        Ok(tables
            .get(&table)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = MemoryStore::new();

        store.put(Table::Peers, b"10.0.0.1", b"record").unwrap();
        assert!(store.contains(Table::Peers, b"10.0.0.1").unwrap());
        assert_eq!(
            store.get(Table::Peers, b"10.0.0.1").unwrap(),
            Some(b"record".to_vec())
        );

        store.delete(Table::Peers, b"10.0.0.1").unwrap();
        assert!(!store.contains(Table::Peers, b"10.0.0.1").unwrap());
    }

    #[test]
    fn test_batch_and_snapshot() {
        let store = MemoryStore::new();

        let mut batch = WriteBatch::new();
        batch.put(Table::Peers, b"10.0.0.1", b"a");
        batch.put(Table::Peers, b"10.0.0.2", b"b");
        batch.delete(Table::Peers, b"10.0.0.1");
        store.write_batch(batch).unwrap();

        let snapshot = store.snapshot(Table::Peers).unwrap();
        assert_eq!(snapshot, vec![(b"10.0.0.2".to_vec(), b"b".to_vec())]);
    }
}
