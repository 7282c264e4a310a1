use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Command line options
#[derive(Debug, Parser)]
#[command(name = "ledger_node", about = "Proof-of-work ledger node")]
pub struct Cli {
    /// Port the HTTP API listens on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

/// Node settings. Only the port is configurable; the rest are fixed.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub port: u16,

    /// Required leading zero hex digits of a block hash
    pub difficulty: usize,

    /// Amount issued to the miner of each block
    pub mining_reward: f64,

    /// Faucet credit when the request names no positive amount
    pub faucet_amount: f64,

    /// How often peers are pulled in the background
    pub sync_interval: Duration,

    /// Bound on a whole peer request
    pub peer_timeout: Duration,

    /// Bound on establishing a peer connection
    pub peer_connect_timeout: Duration,
}

impl NodeConfig {
    pub fn new(port: u16) -> Self {
        NodeConfig {
            port,
            difficulty: 3,
            mining_reward: 10.0,
            faucet_amount: 100.0,
            sync_interval: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(5),
            peer_connect_timeout: Duration::from_secs(2),
        }
    }

    /// The URL other nodes reach this node at
    pub fn self_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Where the chain and peer list are stored; one directory per port so
    /// several local nodes do not share a database
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from("data").join(format!("node-{}", self.port))
    }

    /// Peer list used when none was persisted
    pub fn default_peers(&self) -> Vec<String> {
        vec!["http://localhost:8080".to_string()]
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new(8080)
    }
}

impl From<Cli> for NodeConfig {
    fn from(cli: Cli) -> Self {
        Self::new(cli.port)
    }
}
