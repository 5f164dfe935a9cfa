//! Block and transaction data model.

use serde::{Deserialize, Serialize};

/// A transaction as relayed between peers.
///
/// The networking layer treats the payload as opaque; validation belongs to
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction identifier.
    pub id: String,
    /// Serialized transaction body.
    pub payload: Vec<u8>,
}

/// A block in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block identifier.
    pub id: String,
    /// Identifier of the predecessor block.
    pub previous_id: String,
    /// Height in the chain. The genesis block has height 1.
    pub height: u64,
    /// Creation time, epoch seconds.
    pub timestamp: u64,
    /// Transactions included in this block.
    pub transactions: Vec<Transaction>,
}
