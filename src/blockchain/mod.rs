// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block and transaction structures
// - Signing, verification and address derivation
// - Chain validation and balance replay
// - Proof of work search
// - Pending transaction pool
// - The node service that owns all of the above

pub mod block;
pub mod chain;
pub mod crypto;
pub mod ledger;
pub mod miner;
pub mod pool;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{
    Blockchain, BlockchainError, HistoryEntry, MiningError, TransactionRecord, TxStatus,
};
pub use crypto::{Address, Wallet};
pub use transaction::{Transaction, TransactionError};
