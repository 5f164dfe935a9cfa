//! In-memory blockchain engine.
//!
//! A minimal engine backing the [`Blockchain`] trait for tests: it accepts
//! any block whose predecessor is known, tracks the highest block as the
//! tip, and can be told to refuse specific block ids.

use crate::{Block, Blockchain, ChainError, ChainResult, SubmitOutcome};
use parking_lot::RwLock;
use std::collections::HashMap;

struct Inner {
    blocks: HashMap<String, Block>,
    tip: String,
    /// Block ids to refuse, mapped to whether refusal counts as misbehavior.
    refused: HashMap<String, bool>,
}

/// In-memory `Blockchain` implementation.
pub struct MemoryChain {
    inner: RwLock<Inner>,
}

impl MemoryChain {
    /// Create a chain holding only the given genesis block.
    pub fn new(genesis: Block) -> Self {
        let tip = genesis.id.clone();
        let mut blocks = HashMap::new();
        blocks.insert(genesis.id.clone(), genesis);
        Self {
            inner: RwLock::new(Inner {
                blocks,
                tip,
                refused: HashMap::new(),
            }),
        }
    }

    /// Mark a block id to be refused on submission.
    pub fn refuse(&self, id: &str, misbehaved: bool) {
        self.inner.write().refused.insert(id.to_string(), misbehaved);
    }

    /// Check whether a block id is known.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().blocks.contains_key(id)
    }

    /// Number of blocks held, genesis included.
    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// Whether the chain holds any blocks.
    pub fn is_empty(&self) -> bool {
        self.inner.read().blocks.is_empty()
    }
}

impl Blockchain for MemoryChain {
    fn tip(&self) -> ChainResult<Block> {
        let inner = self.inner.read();
        inner
            .blocks
            .get(&inner.tip)
            .cloned()
            .ok_or_else(|| ChainError::Engine("tip not present".to_string()))
    }

    fn block(&self, id: &str) -> ChainResult<Block> {
        self.inner
            .read()
            .blocks
            .get(id)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(id.to_string()))
    }

    fn submit_block(&self, block: Block) -> SubmitOutcome {
        let mut inner = self.inner.write();

        if let Some(&misbehaved) = inner.refused.get(&block.id) {
            return SubmitOutcome {
                accepted: false,
                misbehaved,
            };
        }

        if !inner.blocks.contains_key(&block.previous_id) {
            return SubmitOutcome {
                accepted: false,
                misbehaved: false,
            };
        }

        let tip_height = inner
            .blocks
            .get(&inner.tip)
            .map(|b| b.height)
            .unwrap_or(0);
        if block.height > tip_height {
            inner.tip = block.id.clone();
        }
        inner.blocks.insert(block.id.clone(), block);

        SubmitOutcome {
            accepted: true,
            misbehaved: false,
        }
    }
}
