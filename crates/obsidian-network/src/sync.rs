//! Chain synchronization worker.
//!
//! Tracks the best height advertised by connected peers and, when we are
//! behind, downloads blocks from one peer at a time: first searching
//! backwards for a common ancestor, then bulk-downloading forward, then
//! handing the buffered blocks to a submission thread that feeds the
//! engine oldest-first. At most one submission thread is alive at a time.

use crate::score::Penalties;
use crate::service::NetworkState;
use obsidian_chain::{Block, ChainError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blocks requested per window.
const DOWNLOAD_WINDOW: u64 = 6;

/// Buffered blocks that trigger a submission pass.
const MAX_BUFFERED_BLOCKS: usize = 2000;

/// Sleep between sync rounds when there is nothing to do.
const RETRY_INTERVAL: Duration = Duration::from_secs(20);

pub(crate) fn run(state: Arc<NetworkState>) {
    let mut sync = Synchronizer::new(state);
    sync.reload_tip();

    while sync.state.running() {
        let sleep = sync.round();
        if sleep {
            sync.state.idle(RETRY_INTERVAL);
            sync.reload_tip();
        }
    }

    sync.join_submission();
}

/// Block download state machine.
pub(crate) struct Synchronizer {
    pub(crate) state: Arc<NetworkState>,
    /// Working height: our tip plus anything downloaded but not yet
    /// submitted. Never drops below 1.
    pub(crate) current: u64,
    /// Height the working pass started from; the common-ancestor search
    /// only runs while we are still at it.
    pub(crate) start: u64,
    submission: Option<JoinHandle<()>>,
    failure: Arc<AtomicBool>,
}

impl Synchronizer {
    pub(crate) fn new(state: Arc<NetworkState>) -> Self {
        Self {
            state,
            current: 0,
            start: 0,
            submission: None,
            failure: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Re-read the local tip and publish it as the current height.
    pub(crate) fn reload_tip(&mut self) {
        match self.state.chain.tip() {
            Ok(tip) => {
                self.current = tip.height;
                self.start = tip.height;
                self.state
                    .current_height
                    .store(tip.height, Ordering::SeqCst);
            }
            Err(error) => warn!(%error, "Could not read the local tip"),
        }
    }

    /// Wait for an in-flight submission to finish.
    ///
    /// Returns whether it reported a failure, clearing the flag.
    pub(crate) fn join_submission(&mut self) -> bool {
        if let Some(handle) = self.submission.take() {
            info!("Waiting for the previous block submission to finish");
            let _ = handle.join();
        }
        self.failure.swap(false, Ordering::SeqCst)
    }

    /// One pass over the pool. Returns whether the caller should back off
    /// and re-read the tip before the next pass.
    pub(crate) fn round(&mut self) -> bool {
        // Determine the best chain on offer. Each peer is leased only
        // briefly, so long-running downloads elsewhere are not blocked.
        let mut best = self.current;
        for key in self.state.shuffled_keys() {
            let Some(connection) = self.state.pool.get(&key) else {
                continue;
            };
            let Some(_lease) = connection.try_acquire() else {
                continue;
            };
            best = best.max(connection.height());
        }
        best = best.max(self.state.current_height.load(Ordering::SeqCst));
        self.state.best_height.store(best, Ordering::SeqCst);

        info!(
            current = self.current,
            best,
            start = self.start,
            "Sync status"
        );

        let mut made_progress = false;

        if best > self.current {
            'peers: for key in self.state.shuffled_keys() {
                let Some(connection) = self.state.pool.get(&key) else {
                    continue;
                };
                let Some(_lease) = connection.try_acquire() else {
                    continue;
                };
                if connection.height() <= self.current {
                    continue;
                }

                // Buffer ordered newest to oldest: the ancestor search
                // appends older blocks at the back, the bulk download
                // prepends newer blocks at the front.
                let mut buffer: VecDeque<Block> = VecDeque::new();

                if self.current == self.start {
                    match self.find_common_ancestor(&key, &connection, best, &mut buffer) {
                        AncestorSearch::Found | AncestorSearch::GaveUp => {}
                        AncestorSearch::Abandoned => continue 'peers,
                    }
                    if !buffer.is_empty() {
                        made_progress = true;
                    }
                    info!(
                        ancestor = self.current.saturating_sub(1),
                        peer = %key,
                        "Starting block download from common ancestor"
                    );
                }

                // Bulk download forward from the ancestor.
                while buffer.len() < MAX_BUFFERED_BLOCKS
                    && self.state.running()
                    && !self.failure.load(Ordering::SeqCst)
                    && self.current < best
                {
                    info!(
                        from = self.current + 1,
                        to = self.current + DOWNLOAD_WINDOW,
                        peer = %key,
                        "Downloading blocks"
                    );
                    match connection.get_blocks(self.current + 1, self.current + DOWNLOAD_WINDOW) {
                        Ok(window) if window.is_empty() => {
                            warn!(peer = %key, "Peer responded with no blocks");
                            break;
                        }
                        Ok(window) => {
                            let fetched = window.len() as u64;
                            for block in window {
                                buffer.push_front(block);
                            }
                            made_progress = true;
                            self.current = (self.current + fetched.max(1)).min(best);
                        }
                        Err(error) => {
                            warn!(peer = %key, %error, "Failed to contact peer while downloading blocks");
                            break;
                        }
                    }
                }

                if self.join_submission() {
                    warn!("Failure processing blocks, restarting from the local tip");
                    self.reload_tip();
                    return true;
                }

                if !buffer.is_empty() {
                    self.spawn_submission(key, buffer.into_iter().collect());
                }
            }
        }

        best <= self.current || self.state.pool.is_empty() || !made_progress
    }

    /// Search backwards in download windows until the engine recognizes
    /// the predecessor of the oldest downloaded block.
    fn find_common_ancestor(
        &mut self,
        key: &str,
        connection: &crate::Connection,
        best: u64,
        buffer: &mut VecDeque<Block>,
    ) -> AncestorSearch {
        while self.state.running() {
            info!(
                from = self.current + 1,
                to = self.current + DOWNLOAD_WINDOW,
                peer = %key,
                "Downloading blocks"
            );
            let window = match connection.get_blocks(self.current + 1, self.current + DOWNLOAD_WINDOW)
            {
                Ok(window) => window,
                Err(error) => {
                    warn!(peer = %key, %error, "Failed to contact peer while downloading blocks");
                    return AncestorSearch::GaveUp;
                }
            };

            let fetched = window.len() as u64;
            if fetched == 0 {
                warn!(peer = %key, "Peer responded with no blocks");
                return AncestorSearch::GaveUp;
            }
            for block in window.into_iter().rev() {
                buffer.push_back(block);
            }

            let Some(oldest) = buffer.back() else {
                return AncestorSearch::GaveUp;
            };
            debug!(
                height = oldest.height.saturating_sub(1),
                id = %oldest.previous_id,
                "Probing for predecessor block"
            );

            match self.state.chain.block(&oldest.previous_id) {
                Ok(_) => {
                    // Clamped so a window overshooting the target cannot
                    // carry the working height past the best chain.
                    self.current = (self.current + fetched).min(best);
                    return AncestorSearch::Found;
                }
                Err(ChainError::NotFound(_)) => {
                    if self.current == 1 {
                        // Nothing above the genesis connects: the peer is
                        // on a different chain entirely.
                        warn!(peer = %key, "Peer has a different genesis block");
                        self.state.change_score(key, Penalties::GENESIS_MISMATCH);
                        return AncestorSearch::Abandoned;
                    }
                    info!(
                        height = oldest.height,
                        previous = %oldest.previous_id,
                        "Predecessor not found, rewinding"
                    );
                    self.current = self.current.saturating_sub(fetched).max(1);
                }
                Err(error) => {
                    warn!(%error, "Engine failure during ancestor search");
                    return AncestorSearch::GaveUp;
                }
            }
        }
        AncestorSearch::GaveUp
    }

    /// Hand the buffered blocks (newest first) to a submission thread.
    fn spawn_submission(&mut self, peer: String, blocks: Vec<Block>) {
        let state = Arc::clone(&self.state);
        let failure = Arc::clone(&self.failure);
        self.submission = Some(std::thread::spawn(move || {
            submit_blocks(&state, &failure, &peer, blocks);
        }));
    }
}

enum AncestorSearch {
    /// The predecessor of the oldest downloaded block is known locally.
    Found,
    /// Transport or engine trouble; the bulk download may still proceed.
    GaveUp,
    /// The peer serves a foreign chain; skip it.
    Abandoned,
}

fn submit_blocks(state: &NetworkState, failure: &AtomicBool, peer: &str, blocks: Vec<Block>) {
    failure.store(false, Ordering::SeqCst);
    info!(count = blocks.len(), peer = %peer, "Submitting blocks to the engine");

    // Oldest first, so every block's predecessor is already in place.
    for block in blocks.iter().rev() {
        if !state.running() {
            break;
        }
        let outcome = state.chain.submit_block(block.clone());
        if outcome.misbehaved {
            state.change_score(peer, Penalties::INVALID_BLOCK);
        }
        if !outcome.accepted {
            failure.store(true, Ordering::SeqCst);
            state.change_score(peer, Penalties::REJECTED_BLOCK);
            warn!(height = block.height, id = %block.id, "Offending block rejected by the engine");
            break;
        }
    }
}
