use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use super::client::PeerClient;
use crate::blockchain::{Block, Blockchain};

/// Outcome of one pull from every peer
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SyncReport {
    /// Number of peers contacted
    pub peers: usize,

    /// Peers that failed at least one request
    pub unreachable: Vec<String>,

    /// Peer whose chain replaced the local one, if any
    pub replaced_by: Option<String>,

    /// New pool entries taken from peers
    pub merged_transactions: usize,

    /// Local chain length after the cycle
    pub chain_length: usize,
}

/// Pulls chain and pool state from peers and pushes mined blocks to them
pub struct SyncEngine {
    blockchain: Arc<Blockchain>,
    client: Arc<dyn PeerClient>,
}

impl SyncEngine {
    pub fn new(blockchain: Arc<Blockchain>, client: Arc<dyn PeerClient>) -> Self {
        SyncEngine { blockchain, client }
    }

    /// Runs one sync cycle against every known peer
    ///
    /// Chains are considered first: any strictly longer valid chain replaces
    /// the local one, so after the cycle the node holds the longest valid
    /// chain it saw. Pools are merged afterwards against the resulting
    /// balances. A failing peer is logged and skipped.
    pub async fn sync_with_peers(&self) -> SyncReport {
        let peers = self.blockchain.peers();
        let mut report = SyncReport {
            peers: peers.len(),
            ..SyncReport::default()
        };

        let chains = join_all(peers.iter().map(|peer| async move {
            (peer, self.client.fetch_chain(peer).await)
        }))
        .await;

        for (peer, result) in chains {
            match result {
                Ok(chain) => {
                    let length = chain.len();
                    if self.blockchain.adopt_chain(chain) {
                        info!("Adopted chain of length {} from {}", length, peer);
                        report.replaced_by = Some(peer.clone());
                    } else {
                        debug!("Kept local chain over chain of length {} from {}", length, peer);
                    }
                }
                Err(err) => {
                    warn!("Skipping chain of {}: {}", peer, err);
                    report.unreachable.push(peer.clone());
                }
            }
        }

        let pools = join_all(peers.iter().map(|peer| async move {
            (peer, self.client.fetch_pool(peer).await)
        }))
        .await;

        for (peer, result) in pools {
            match result {
                Ok(remote) => {
                    let merged = self.blockchain.merge_pool(remote);
                    if merged > 0 {
                        debug!("Merged {} pool entries from {}", merged, peer);
                    }
                    report.merged_transactions += merged;
                }
                Err(err) => {
                    warn!("Skipping pool of {}: {}", peer, err);
                    if !report.unreachable.contains(peer) {
                        report.unreachable.push(peer.clone());
                    }
                }
            }
        }

        report.chain_length = self.blockchain.chain_len();
        info!(
            "Sync finished: {} peers, {} unreachable, chain length {}, {} transactions merged",
            report.peers,
            report.unreachable.len(),
            report.chain_length,
            report.merged_transactions
        );
        report
    }

    /// Pushes a block to every peer once; returns how many accepted the request
    pub async fn broadcast(&self, block: &Block) -> usize {
        let peers = self.blockchain.peers();

        let results = join_all(peers.iter().map(|peer| async move {
            (peer, self.client.push_block(peer, block).await)
        }))
        .await;

        let mut delivered = 0;
        for (peer, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => warn!("Failed to push block {} to {}: {}", block.index, peer, err),
            }
        }

        debug!("Block {} pushed to {}/{} peers", block.index, delivered, peers.len());
        delivered
    }

    /// Broadcasts without making the caller wait
    pub fn broadcast_in_background(self: &Arc<Self>, block: Block) -> JoinHandle<usize> {
        let engine = self.clone();
        tokio::spawn(async move { engine.broadcast(&block).await })
    }

    /// Starts a task that syncs every `interval` until aborted
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                engine.sync_with_peers().await;
            }
        })
    }
}
