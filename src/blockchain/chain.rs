use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use super::block::Block;
use super::crypto::{Address, CryptoError, Wallet};
use super::ledger::{validate_chain, BlockError, Ledger};
use super::miner;
use super::pool::TransactionPool;
use super::storage::{BlockchainStorage, StorageError};
use super::transaction::{Transaction, TransactionError};
use crate::config::NodeConfig;
use crate::network::{PeerError, PeerSet};

/// How many times mining restarts after the tip moved underneath it
const MAX_MINING_ATTEMPTS: usize = 3;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Peer error: {0}")]
    PeerError(#[from] PeerError),

    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),

    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] BlockError),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

/// Reasons a mining request produced no block
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("Miner address is required")]
    MissingMiner,

    #[error("Transaction pool is empty")]
    EmptyPool,

    #[error("No valid transactions to package")]
    NothingToMine,

    #[error("Chain tip advanced {0} times while mining")]
    TipAdvanced(usize),

    #[error("Mining was cancelled")]
    Cancelled,

    #[error("Mining worker failed: {0}")]
    Worker(String),
}

/// Whether a transaction is in a block or still waiting in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Confirmed,
    Pending,
}

/// A transaction together with where it currently lives
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionRecord {
    pub status: TxStatus,

    /// Index of the containing block, for confirmed transactions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u64>,

    /// Creation time of the transaction, unix seconds
    pub timestamp: i64,

    pub tx: Transaction,
}

/// One line of an account's history
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryEntry {
    pub from: Address,
    pub to: Address,
    pub amount: f64,
    pub status: TxStatus,
    pub timestamp: i64,
    pub txid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u64>,
}

impl TransactionRecord {
    fn new(status: TxStatus, block: Option<u64>, tx: &Transaction) -> Self {
        TransactionRecord {
            status,
            block,
            timestamp: tx.timestamp,
            tx: tx.clone(),
        }
    }
}

impl From<TransactionRecord> for HistoryEntry {
    fn from(record: TransactionRecord) -> Self {
        HistoryEntry {
            from: record.tx.from,
            to: record.tx.to,
            amount: record.tx.amount,
            status: record.status,
            timestamp: record.timestamp,
            txid: record.tx.txid,
            block: record.block,
        }
    }
}

/// Everything that must change together: the chain, its balances and the pool
#[derive(Debug)]
struct LedgerState {
    ledger: Ledger,
    pool: TransactionPool,
}

/// The node's single owner of ledger state
///
/// All mutation goes through one write lock over [`LedgerState`]; queries
/// take the read lock and return copies.
#[derive(Debug)]
pub struct Blockchain {
    state: RwLock<LedgerState>,

    /// Sibling nodes
    peers: PeerSet,

    /// Storage for the chain snapshot and peer list
    storage: Option<Arc<BlockchainStorage>>,

    config: NodeConfig,

    /// Bumped whenever the tip changes, so an in-flight search can stop early
    tip_version: Arc<AtomicU64>,

    shutdown: Arc<AtomicBool>,
}

impl Blockchain {
    /// Creates an in-memory blockchain with a genesis block
    pub fn new(config: NodeConfig) -> Self {
        let ledger = Ledger::new(config.difficulty);
        let peers = PeerSet::with_peers(config.self_url(), config.default_peers());
        Self::from_parts(ledger, peers, None, config)
    }

    /// Creates a blockchain backed by persistent storage
    ///
    /// An empty database gets a fresh genesis block and the default peer list.
    /// A stored chain that fails validation is an error; the node must not
    /// serve it.
    ///
    /// # Arguments
    ///
    /// * `storage_path` - Directory of the sled database
    /// * `config` - Node settings
    ///
    /// # Returns
    ///
    /// The node, or `InvalidChain` if the stored chain is corrupt
    pub fn with_storage<P: AsRef<Path>>(
        storage_path: P,
        config: NodeConfig,
    ) -> Result<Self, BlockchainError> {
        let storage = BlockchainStorage::new(storage_path)?;
        Self::from_storage(storage, config)
    }

    fn from_storage(storage: BlockchainStorage, config: NodeConfig) -> Result<Self, BlockchainError> {
        let blocks = storage.get_all_blocks()?;

        let ledger = if blocks.is_empty() {
            info!("No existing blockchain found in storage, creating genesis block");
            let ledger = Ledger::new(config.difficulty);
            storage.save_chain(ledger.chain())?;
            ledger
        } else {
            let length = blocks.len();
            let ledger = Ledger::from_chain(blocks, config.difficulty).ok_or_else(|| {
                BlockchainError::InvalidChain("stored chain failed validation".to_string())
            })?;
            info!("Loaded {} blocks from storage", length);
            ledger
        };

        let mut urls = storage.get_all_peers()?;
        if urls.is_empty() {
            info!("No peers found in storage, using defaults");
            urls = config.default_peers();
            for url in &urls {
                storage.save_peer(url)?;
            }
        }
        let peers = PeerSet::with_peers(config.self_url(), urls);

        Ok(Self::from_parts(ledger, peers, Some(Arc::new(storage)), config))
    }

    fn from_parts(
        ledger: Ledger,
        peers: PeerSet,
        storage: Option<Arc<BlockchainStorage>>,
        config: NodeConfig,
    ) -> Self {
        Blockchain {
            state: RwLock::new(LedgerState {
                ledger,
                pool: TransactionPool::new(),
            }),
            peers,
            storage,
            config,
            tip_version: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        self.read().ledger.chain().to_vec()
    }

    pub fn chain_len(&self) -> usize {
        self.read().ledger.len()
    }

    /// Gets the last block in the chain
    pub fn get_last_block(&self) -> Block {
        self.read().ledger.tip().clone()
    }

    /// Gets all pending transactions in arrival order
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.read().pool.entries().cloned().collect()
    }

    /// Confirmed balance of an address
    ///
    /// # Returns
    ///
    /// `None` if the address never appeared in the chain
    pub fn balance(&self, address: &Address) -> Option<f64> {
        self.read().ledger.balance(address)
    }

    /// Validates the current chain
    pub fn is_valid(&self) -> bool {
        let state = self.read();
        validate_chain(state.ledger.chain(), state.ledger.difficulty())
    }

    /// Looks a transaction up in the chain first, then in the pool
    pub fn find_transaction(&self, txid: &str) -> Option<TransactionRecord> {
        let state = self.read();

        if let Some((index, tx)) = state.ledger.find_transaction(txid) {
            return Some(TransactionRecord::new(TxStatus::Confirmed, Some(index), tx));
        }

        state
            .pool
            .get(txid)
            .map(|tx| TransactionRecord::new(TxStatus::Pending, None, tx))
    }

    /// Confirmed and pending transactions of an address, newest first
    ///
    /// # Arguments
    ///
    /// * `address` - Sender or recipient to look for
    ///
    /// # Returns
    ///
    /// Flat entries with status and timestamp; empty for an unknown address
    pub fn history(&self, address: &Address) -> Vec<HistoryEntry> {
        let state = self.read();

        let confirmed = state
            .ledger
            .history(address)
            .into_iter()
            .map(|(index, tx)| TransactionRecord::new(TxStatus::Confirmed, Some(index), tx));
        let pending = state
            .pool
            .entries()
            .filter(|tx| tx.involves(address))
            .map(|tx| TransactionRecord::new(TxStatus::Pending, None, tx));

        let mut entries: Vec<HistoryEntry> =
            confirmed.chain(pending).map(HistoryEntry::from).collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Adds a pre-signed transaction to the pool
    ///
    /// Returns `false` if it was already pending.
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<bool, BlockchainError> {
        let mut guard = self.write();
        let state = &mut *guard;
        let txid = transaction.txid.clone();

        let added = state.pool.submit(transaction, &state.ledger)?;
        if added {
            debug!("Transaction {} added to the pool", txid);
        }
        Ok(added)
    }

    /// Signs a transfer with a hex private key and adds it to the pool
    ///
    /// `from` must be the address the key derives to.
    ///
    /// # Arguments
    ///
    /// * `private_key` - Hex encoded P-256 secret scalar
    /// * `from` - Claimed sender address
    /// * `to` - Recipient address
    /// * `amount` - Amount to transfer
    pub fn sign_and_submit(
        &self,
        private_key: &str,
        from: &str,
        to: &str,
        amount: f64,
    ) -> Result<Transaction, BlockchainError> {
        let wallet = Wallet::from_secret_key_hex(private_key)?;

        if wallet.address().as_str() != from {
            return Err(TransactionError::AddressMismatch.into());
        }

        if to.trim().is_empty() {
            return Err(TransactionError::InvalidAddress("empty recipient".to_string()).into());
        }

        let transaction = Transaction::signed(&wallet, Address::from(to), amount, Utc::now().timestamp());
        self.submit_transaction(transaction.clone())?;
        Ok(transaction)
    }

    /// Queues a system credit to an address
    ///
    /// A missing or non-positive amount falls back to the configured default.
    pub fn faucet(&self, to: &str, amount: Option<f64>) -> Result<Transaction, BlockchainError> {
        if to.trim().is_empty() {
            return Err(TransactionError::InvalidAddress("empty recipient".to_string()).into());
        }

        let amount = match amount {
            Some(amount) if amount.is_finite() && amount > 0.0 => amount,
            _ => self.config.faucet_amount,
        };

        let transaction = Transaction::new_system(Address::from(to), amount, Utc::now().timestamp());
        self.submit_transaction(transaction.clone())?;
        info!("Faucet queued {} for {}", amount, to);
        Ok(transaction)
    }

    /// Mines a new block with the pending transactions and a reward for `miner`
    ///
    /// The proof-of-work search runs on a blocking thread without holding the
    /// lock. If another block was appended meanwhile, the result is dropped
    /// and mining restarts on the new tip.
    ///
    /// # Arguments
    ///
    /// * `miner` - Address credited with the mining reward
    ///
    /// # Returns
    ///
    /// The appended block. `TipAdvanced` after three lost races, `Cancelled`
    /// on shutdown.
    pub async fn mine(&self, miner: &str) -> Result<Block, BlockchainError> {
        let miner = miner.trim();
        if miner.is_empty() {
            return Err(MiningError::MissingMiner.into());
        }

        for attempt in 1..=MAX_MINING_ATTEMPTS {
            let (tip, transactions, version) = {
                let state = self.read();
                if state.pool.is_empty() {
                    return Err(MiningError::EmptyPool.into());
                }

                let mut transactions = state.pool.select_for_mining(&state.ledger);
                if transactions.is_empty() {
                    return Err(MiningError::NothingToMine.into());
                }

                let reward = reward_transaction(
                    &state.ledger,
                    &transactions,
                    Address::from(miner),
                    self.config.mining_reward,
                );
                transactions.push(reward);

                (
                    state.ledger.tip().clone(),
                    transactions,
                    self.tip_version.load(Ordering::SeqCst),
                )
            };

            let difficulty = self.config.difficulty;
            let tip_version = self.tip_version.clone();
            let shutdown = self.shutdown.clone();

            let mined = tokio::task::spawn_blocking(move || {
                miner::mine_block(&tip, transactions, difficulty, || {
                    shutdown.load(Ordering::Relaxed) || tip_version.load(Ordering::SeqCst) != version
                })
            })
            .await
            .map_err(|e| MiningError::Worker(e.to_string()))?;

            let block = match mined {
                Some(block) => block,
                None if self.shutdown.load(Ordering::Relaxed) => {
                    return Err(MiningError::Cancelled.into());
                }
                None => {
                    info!("Chain tip advanced during mining (attempt {}), restarting", attempt);
                    continue;
                }
            };

            let mut guard = self.write();
            let state = &mut *guard;
            match state.ledger.append(block.clone()) {
                Ok(()) => {
                    state.pool.reconcile_after_block(&block);
                    self.tip_version.fetch_add(1, Ordering::SeqCst);
                    self.persist(&state.ledger);
                    info!(
                        "Mined block {} with {} transactions, hash {}",
                        block.index,
                        block.txs.len(),
                        block.hash
                    );
                    return Ok(block);
                }
                Err(BlockError::NotLinked { .. }) => {
                    info!("Mined block {} went stale (attempt {}), restarting", block.index, attempt);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(MiningError::TipAdvanced(MAX_MINING_ATTEMPTS).into())
    }

    /// Appends a block pushed by a peer if it extends the local tip
    ///
    /// Anything else is ignored; returns whether the block was accepted.
    pub fn receive_block(&self, block: Block) -> bool {
        let mut guard = self.write();
        let state = &mut *guard;
        let index = block.index;

        match state.ledger.append(block.clone()) {
            Ok(()) => {
                state.pool.reconcile_after_block(&block);
                self.tip_version.fetch_add(1, Ordering::SeqCst);
                self.persist(&state.ledger);
                info!("Accepted pushed block {}", index);
                true
            }
            Err(err) => {
                debug!("Ignoring pushed block {}: {}", index, err);
                false
            }
        }
    }

    /// Replaces the local chain with `candidate` if it is strictly longer
    /// and valid, then rebuilds balances and prunes the pool
    ///
    /// Validation runs before the lock is taken.
    ///
    /// # Arguments
    ///
    /// * `candidate` - A peer's full chain
    ///
    /// # Returns
    ///
    /// Whether the chain was replaced
    pub fn adopt_chain(&self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain_len() {
            return false;
        }

        if !validate_chain(&candidate, self.config.difficulty) {
            debug!("Ignoring invalid chain of length {}", candidate.len());
            return false;
        }

        let mut guard = self.write();
        let state = &mut *guard;
        let length = candidate.len();

        if !state.ledger.adopt_validated(candidate) {
            return false;
        }

        state.pool.retain_unconfirmed(&state.ledger);
        self.tip_version.fetch_add(1, Ordering::SeqCst);
        self.persist(&state.ledger);
        info!("Replaced local chain with a chain of length {}", length);
        true
    }

    /// Adds the valid entries of a peer's pool; returns how many were new
    pub fn merge_pool(&self, remote: Vec<Transaction>) -> usize {
        let mut guard = self.write();
        let state = &mut *guard;
        state.pool.merge_from_peer(remote, &state.ledger)
    }

    /// Known peers
    pub fn peers(&self) -> Vec<String> {
        self.peers.list()
    }

    /// Adds a peer and records it. Returns `false` if it was already known.
    pub fn add_peer(&self, url: &str) -> Result<bool, BlockchainError> {
        let added = self.peers.add(url)?;

        if added {
            if let Some(storage) = &self.storage {
                storage.save_peer(url.trim().trim_end_matches('/'))?;
            }
            info!("Added peer {}", url);
        }

        Ok(added)
    }

    /// Stops any in-flight proof-of-work search
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Writes the chain snapshot. The in-memory chain stays authoritative if
    /// the write fails.
    fn persist(&self, ledger: &Ledger) {
        if let Some(storage) = &self.storage {
            match storage.save_chain(ledger.chain()) {
                Ok(()) => debug!("Saved chain of length {} to storage", ledger.len()),
                Err(err) => error!("Failed to save chain to storage: {}", err),
            }
        } else {
            warn!("No storage configured, chain of length {} kept in memory only", ledger.len());
        }
    }
}

/// Builds the mining reward for a batch
///
/// Two rewards for the same miner within one second would hash to the same
/// txid, so the timestamp moves forward until the txid is unused by the chain
/// and by the batch.
fn reward_transaction(
    ledger: &Ledger,
    batch: &[Transaction],
    miner: Address,
    amount: f64,
) -> Transaction {
    let mut timestamp = Utc::now().timestamp();
    loop {
        let reward = Transaction::new_system(miner.clone(), amount, timestamp);
        let taken = ledger.contains_txid(&reward.txid)
            || batch.iter().any(|tx| tx.txid == reward.txid);
        if !taken {
            return reward;
        }
        timestamp += 1;
    }
}
