use std::path::Path;

use sled::{Batch, Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Storage for the chain snapshot and the peer list
pub struct BlockchainStorage {
    /// The database instance
    db: Db,

    /// Blocks keyed by big-endian index, so iteration is chain order
    blocks: Tree,

    /// Peer URLs as keys
    peers: Tree,
}

impl std::fmt::Debug for BlockchainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainStorage")
            .field("blocks", &self.blocks.len())
            .field("peers", &self.peers.len())
            .finish()
    }
}

impl BlockchainStorage {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Directory of the sled database
    ///
    /// # Returns
    ///
    /// The storage with its `blocks` and `peers` trees opened
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens a throwaway database that is removed when dropped
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let blocks = db.open_tree("blocks")?;
        let peers = db.open_tree("peers")?;

        Ok(Self { db, blocks, peers })
    }

    /// Writes the whole chain snapshot atomically
    ///
    /// Blocks beyond the new chain's length (left over from a longer chain
    /// that was replaced) are removed in the same batch.
    ///
    /// # Arguments
    ///
    /// * `chain` - The full chain, genesis first
    pub fn save_chain(&self, chain: &[Block]) -> Result<(), StorageError> {
        let mut batch = Batch::default();

        for block in chain {
            let value = bincode::serialize(block)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            batch.insert(block.index.to_be_bytes().to_vec(), value);
        }

        let stale_from = (chain.len() as u64).to_be_bytes();
        for key in self.blocks.range(stale_from..).keys() {
            batch.remove(key?);
        }

        self.blocks.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    /// Reads the chain snapshot in index order
    ///
    /// An empty result means nothing was ever saved. A record that does not
    /// decode fails the whole load.
    ///
    /// # Returns
    ///
    /// The stored blocks, or an empty vector for a fresh database
    pub fn get_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();

        for result in self.blocks.iter() {
            let (key, value) = result?;
            let block = bincode::deserialize::<Block>(&value).map_err(|e| {
                StorageError::DeserializationError(format!(
                    "block {}: {}",
                    hex::encode(&key),
                    e
                ))
            })?;
            blocks.push(block);
        }

        Ok(blocks)
    }

    /// Records a peer URL
    ///
    /// # Arguments
    ///
    /// * `url` - Normalized peer URL; recording it twice is harmless
    pub fn save_peer(&self, url: &str) -> Result<(), StorageError> {
        self.peers.insert(url.as_bytes(), &b""[..])?;
        self.db.flush()?;
        Ok(())
    }

    /// Reads every recorded peer URL
    pub fn get_all_peers(&self) -> Result<Vec<String>, StorageError> {
        self.peers
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                String::from_utf8(key.to_vec())
                    .map_err(|e| StorageError::DeserializationError(e.to_string()))
            })
            .collect()
    }
}
