use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::Block;
use crate::network::SyncReport;

/// Query of the mine endpoint
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MineQuery {
    /// Address that receives the mining reward
    pub miner: Option<String>,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Response for the add endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub message: String,
    pub txid: String,

    /// False when the transaction was already pending
    pub queued: bool,
}

/// Request for the faucet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FaucetRequest {
    /// Address to credit
    pub to: String,

    /// Amount to credit; the node default applies when missing or not positive
    pub amount: Option<f64>,
}

/// Response for the faucet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FaucetResponse {
    pub message: String,
    pub status: String,
    pub to: String,
    pub amount: f64,
    pub txid: String,
    pub timestamp: i64,
}

/// Request for the signTx endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignTxRequest {
    /// Sender address, must match the private key
    pub from: String,

    /// Recipient address
    pub to: String,

    /// The amount to transfer
    pub amount: f64,

    /// Hex encoded P-256 private scalar
    #[serde(rename = "privKey")]
    pub priv_key: String,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    /// The wallet's private key (hex encoded)
    pub private_key: String,

    /// The wallet's public key, hex encoded `x || y`
    pub public_key: String,

    /// The wallet's address
    pub address: String,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub account: String,
    pub balance: f64,
}

/// Request for adding a peer
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PeerRequest {
    /// Base URL of the peer, e.g. `http://localhost:8081`
    pub url: String,
}

/// Response for adding a peer
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PeerResponse {
    pub message: String,
    pub peer: String,
}

/// Response for the sync endpoint
#[derive(Serialize, ToSchema)]
pub struct SyncResponse {
    pub message: String,
    pub report: SyncReport,
}

/// Response for the receive endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReceiveResponse {
    /// Whether the block was appended
    pub accepted: bool,
}
