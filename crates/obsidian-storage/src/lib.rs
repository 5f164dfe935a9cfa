//! # obsidian-storage
//!
//! Key-value storage layer for the Obsidian node.
//!
//! This crate provides a RocksDB-based storage abstraction with support for:
//! - Named tables (column families) for different data types
//! - Atomic batch writes
//! - Point-in-time snapshot reads
//!
//! ## Tables
//!
//! - `Peers`: known peer addresses and their metadata, keyed by textual IP

mod batch;
mod database;
mod error;
mod memory;

pub use batch::WriteBatch;
pub use database::{Database, Table};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

/// Storage trait for abstracting database operations.
///
/// This allows for easy testing with mock implementations.
pub trait Storage: Send + Sync {
    /// Get a value by key from a table.
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a key-value pair into a table.
    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key from a table.
    fn delete(&self, table: Table, key: &[u8]) -> StorageResult<()>;

    /// Check if a key exists in a table.
    fn contains(&self, table: Table, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(table, key)?.is_some())
    }

    /// Execute a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Collect a point-in-time snapshot of a table.
    ///
    /// The returned pairs are stable against writes performed after the
    /// call, so callers can scan without holding any storage lock.
    fn snapshot(&self, table: Table) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
}
