use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::crypto::Address;
use super::transaction::Transaction;

/// Recipient of the zero-value transfer recorded in the genesis block
const GENESIS_RECIPIENT: &str = "GENESIS";

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block
    pub txs: Vec<Transaction>,

    /// Hash of the previous block
    #[serde(rename = "prevHash")]
    pub prev_hash: String,

    /// Hash of the current block
    pub hash: String,

    /// Proof of work
    pub nonce: u64,
}

impl Block {
    /// Creates the genesis block
    pub fn genesis() -> Self {
        let mut block = Block {
            index: 0,
            timestamp: Utc::now(),
            txs: vec![Transaction::new_system(Address::from(GENESIS_RECIPIENT), 0.0, 0)],
            prev_hash: String::new(),
            hash: String::new(),
            nonce: 0,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Creates an unsealed successor of `prev` carrying `txs`
    ///
    /// The hash is left empty until a nonce has been found.
    pub fn candidate(prev: &Block, txs: Vec<Transaction>) -> Self {
        Block {
            index: prev.index + 1,
            timestamp: Utc::now(),
            txs,
            prev_hash: prev.hash.clone(),
            hash: String::new(),
            nonce: 0,
        }
    }

    /// Calculates the hash of the block
    ///
    /// SHA-256 over index, timestamp, previous hash, nonce and the canonical
    /// message of every transaction, in that order.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.index.to_string().as_bytes());
        hasher.update(
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(self.nonce.to_string().as_bytes());
        for tx in &self.txs {
            hasher.update(tx.canonical_message().as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Whether the stored hash is the recomputed one
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Whether the stored hash starts with `difficulty` zero hex digits
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    pub fn contains_txid(&self, txid: &str) -> bool {
        self.txs.iter().any(|tx| tx.txid == txid)
    }
}

pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}
