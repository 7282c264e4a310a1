use dashmap::DashSet;
use log::warn;

use super::client::PeerError;

/// The sibling nodes this node synchronizes with, excluding itself
#[derive(Debug)]
pub struct PeerSet {
    peers: DashSet<String>,
    self_url: String,
}

impl PeerSet {
    pub fn new(self_url: impl Into<String>) -> Self {
        PeerSet {
            peers: DashSet::new(),
            self_url: normalize(&self_url.into()),
        }
    }

    /// Creates a set from loaded URLs
    ///
    /// This node's own URL is skipped quietly; anything else that cannot be
    /// added is skipped with a warning.
    ///
    /// # Arguments
    ///
    /// * `self_url` - URL this node is reachable at
    /// * `urls` - Stored or default peer URLs
    pub fn with_peers<I>(self_url: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let set = Self::new(self_url);
        for url in urls {
            match set.add(&url) {
                Ok(_) | Err(PeerError::SelfPeer) => {}
                Err(err) => warn!("Ignoring stored peer {:?}: {}", url, err),
            }
        }
        set
    }

    /// Adds a peer. Returns `Ok(false)` if it was already known.
    pub fn add(&self, url: &str) -> Result<bool, PeerError> {
        let url = normalize(url);

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PeerError::InvalidUrl(url));
        }

        if url == self.self_url {
            return Err(PeerError::SelfPeer);
        }

        Ok(self.peers.insert(url))
    }

    /// Known peers, sorted
    pub fn list(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().map(|p| p.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list() {
        let peers = PeerSet::new("http://localhost:8080");

        assert!(peers.add("http://localhost:8082").unwrap());
        assert!(peers.add("http://localhost:8081/").unwrap());
        assert!(!peers.add("http://localhost:8081").unwrap());

        assert_eq!(
            peers.list(),
            vec!["http://localhost:8081".to_string(), "http://localhost:8082".to_string()]
        );
    }

    #[test]
    fn test_self_is_excluded() {
        let peers = PeerSet::new("http://localhost:8080");
        assert!(matches!(peers.add("http://localhost:8080/"), Err(PeerError::SelfPeer)));
        assert!(peers.is_empty());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let peers = PeerSet::new("http://localhost:8080");
        assert!(matches!(peers.add("localhost:9000"), Err(PeerError::InvalidUrl(_))));
    }

    #[test]
    fn test_with_peers_filters_self() {
        let peers = PeerSet::with_peers(
            "http://localhost:8080",
            vec!["http://localhost:8080".to_string(), "http://localhost:8081".to_string()],
        );
        assert_eq!(peers.list(), vec!["http://localhost:8081".to_string()]);
    }

    #[test]
    fn test_with_peers_skips_invalid_urls() {
        let peers = PeerSet::with_peers(
            "http://localhost:8080",
            vec![
                "ftp://localhost:8081".to_string(),
                "localhost:8082".to_string(),
                "https://node.example:8083/".to_string(),
            ],
        );
        assert_eq!(peers.list(), vec!["https://node.example:8083".to_string()]);
        assert_eq!(peers.len(), 1);
    }
}
