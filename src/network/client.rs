use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::blockchain::{Block, Transaction};

/// Errors from talking to a peer
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Peer request timed out: {0}")]
    Timeout(String),

    #[error("Peer answered with status {0}")]
    BadStatus(u16),

    #[error("Malformed peer response: {0}")]
    Decode(String),

    #[error("Invalid peer URL: {0}")]
    InvalidUrl(String),

    #[error("A node cannot be its own peer")]
    SelfPeer,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Outbound calls the sync engine makes to sibling nodes
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Full chain of the peer
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError>;

    /// Pending pool of the peer
    async fn fetch_pool(&self, peer: &str) -> Result<Vec<Transaction>, PeerError>;

    /// Pushes a freshly mined block to the peer
    async fn push_block(&self, peer: &str, block: &Block) -> Result<(), PeerError>;
}

/// Talks to peers over their HTTP API
pub struct HttpPeerClient {
    http_client: reqwest::Client,
}

impl HttpPeerClient {
    /// Every request is bounded by `timeout`, connecting by `connect_timeout`
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, PeerError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| PeerError::Client(e.to_string()))?;

        Ok(Self { http_client })
    }

    async fn get_json<T>(&self, url: String) -> Result<T, PeerError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.http_client.get(&url).send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(PeerError::BadStatus(response.status().as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PeerError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        self.get_json(format!("{}/blocks", peer)).await
    }

    async fn fetch_pool(&self, peer: &str) -> Result<Vec<Transaction>, PeerError> {
        self.get_json(format!("{}/txpool", peer)).await
    }

    async fn push_block(&self, peer: &str, block: &Block) -> Result<(), PeerError> {
        let response = self
            .http_client
            .post(format!("{}/receive", peer))
            .json(block)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(PeerError::BadStatus(response.status().as_u16()));
        }

        Ok(())
    }
}

fn map_send_error(e: reqwest::Error) -> PeerError {
    if e.is_timeout() {
        PeerError::Timeout(e.to_string())
    } else if e.is_decode() {
        PeerError::Decode(e.to_string())
    } else {
        PeerError::Unreachable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_peer_is_an_error() {
        let client =
            HttpPeerClient::new(Duration::from_millis(500), Duration::from_millis(200)).unwrap();

        // port 9 (discard) is not served by anything in the test environment
        let result = client.fetch_chain("http://127.0.0.1:9").await;
        assert!(matches!(
            result,
            Err(PeerError::Unreachable(_)) | Err(PeerError::Timeout(_))
        ));
    }
}
