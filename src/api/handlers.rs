use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};

use super::schema::{
    BalanceResponse, FaucetRequest, FaucetResponse, MineQuery, MineResponse, PeerRequest,
    PeerResponse, ReceiveResponse, SignTxRequest, SubmitResponse, SyncResponse, WalletResponse,
};
use crate::blockchain::{
    Address, Block, Blockchain, BlockchainError, HistoryEntry, MiningError, Transaction,
    TransactionError, TransactionRecord, Wallet,
};
use crate::network::{PeerError, SyncEngine};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

/// Data structure for the sync engine
pub type SyncData = web::Data<SyncEngine>;

impl ResponseError for BlockchainError {
    fn status_code(&self) -> StatusCode {
        match self {
            BlockchainError::TransactionError(
                TransactionError::AddressMismatch | TransactionError::ForeignKey,
            ) => StatusCode::FORBIDDEN,
            BlockchainError::TransactionError(_)
            | BlockchainError::CryptoError(_)
            | BlockchainError::InvalidBlock(_) => StatusCode::BAD_REQUEST,
            BlockchainError::MiningError(err) => match err {
                MiningError::MissingMiner | MiningError::EmptyPool | MiningError::NothingToMine => {
                    StatusCode::BAD_REQUEST
                }
                MiningError::TipAdvanced(_) => StatusCode::CONFLICT,
                MiningError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                MiningError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            BlockchainError::PeerError(PeerError::InvalidUrl(_) | PeerError::SelfPeer) => {
                StatusCode::BAD_REQUEST
            }
            BlockchainError::PeerError(_) => StatusCode::BAD_GATEWAY,
            BlockchainError::StorageError(_) | BlockchainError::InvalidChain(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}

/// Get the full blockchain
///
/// Returns every block from genesis to the tip
#[utoipa::path(
    get,
    path = "/blocks",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = Vec<Block>)
    )
)]
pub async fn get_blocks(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.get_chain())
}

/// Get a transaction by id
///
/// Looks in the chain first, then in the pending pool
#[utoipa::path(
    get,
    path = "/tx/{txid}",
    params(
        ("txid" = String, Path, description = "Transaction id")
    ),
    responses(
        (status = 200, description = "Transaction found", body = TransactionRecord),
        (status = 404, description = "Transaction not found")
    )
)]
pub async fn get_transaction(blockchain: BlockchainData, txid: web::Path<String>) -> impl Responder {
    match blockchain.find_transaction(&txid) {
        Some(record) => HttpResponse::Ok().json(record),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Transaction {} not found", txid)
        })),
    }
}

/// Get the balance of an address
#[utoipa::path(
    get,
    path = "/balance/{address}",
    params(
        ("address" = String, Path, description = "Account address")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse),
        (status = 404, description = "Account not found")
    )
)]
pub async fn get_balance(blockchain: BlockchainData, address: web::Path<String>) -> impl Responder {
    let account = Address(address.into_inner());

    match blockchain.balance(&account) {
        Some(balance) => HttpResponse::Ok().json(BalanceResponse {
            account: account.0,
            balance,
        }),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Account {} not found", account)
        })),
    }
}

/// Get the transaction history of an address
///
/// Confirmed and pending transactions, newest first
#[utoipa::path(
    get,
    path = "/txs/{address}",
    params(
        ("address" = String, Path, description = "Account address")
    ),
    responses(
        (status = 200, description = "History retrieved successfully", body = Vec<HistoryEntry>)
    )
)]
pub async fn get_history(blockchain: BlockchainData, address: web::Path<String>) -> impl Responder {
    let account = Address(address.into_inner());
    HttpResponse::Ok().json(blockchain.history(&account))
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/txpool",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.get_pending_transactions())
}

/// Submit a signed transaction
///
/// Adds a pre-signed transaction to the pending pool
#[utoipa::path(
    post,
    path = "/add",
    request_body = Transaction,
    responses(
        (status = 200, description = "Transaction accepted", body = SubmitResponse),
        (status = 400, description = "Invalid transaction")
    )
)]
pub async fn add_transaction(
    blockchain: BlockchainData,
    transaction: web::Json<Transaction>,
) -> Result<HttpResponse, BlockchainError> {
    let transaction = transaction.into_inner();
    let txid = transaction.txid.clone();
    let queued = blockchain.submit_transaction(transaction)?;

    let message = if queued {
        "Transaction added to the pool"
    } else {
        "Transaction is already pending"
    };

    Ok(HttpResponse::Ok().json(SubmitResponse {
        message: message.to_string(),
        txid,
        queued,
    }))
}

/// Sign and submit a transaction
///
/// Signs a transfer with the given private key and adds it to the pool
#[utoipa::path(
    post,
    path = "/signTx",
    request_body = SignTxRequest,
    responses(
        (status = 200, description = "Transaction signed and queued", body = Transaction),
        (status = 400, description = "Invalid transaction or key"),
        (status = 403, description = "From address does not match the private key")
    )
)]
pub async fn sign_transaction(
    blockchain: BlockchainData,
    request: web::Json<SignTxRequest>,
) -> Result<HttpResponse, BlockchainError> {
    let transaction =
        blockchain.sign_and_submit(&request.priv_key, &request.from, &request.to, request.amount)?;

    Ok(HttpResponse::Ok().json(transaction))
}

/// Request faucet funds
///
/// Queues a system credit that is applied once a block is mined
#[utoipa::path(
    post,
    path = "/faucet",
    request_body = FaucetRequest,
    responses(
        (status = 200, description = "Credit queued", body = FaucetResponse),
        (status = 400, description = "Invalid address")
    )
)]
pub async fn faucet(
    blockchain: BlockchainData,
    request: web::Json<FaucetRequest>,
) -> Result<HttpResponse, BlockchainError> {
    let transaction = blockchain.faucet(&request.to, request.amount)?;

    Ok(HttpResponse::Ok().json(FaucetResponse {
        message: "Faucet requested, waiting for a miner".to_string(),
        status: "queued".to_string(),
        to: transaction.to.0,
        amount: transaction.amount,
        txid: transaction.txid,
        timestamp: transaction.timestamp,
    }))
}

/// Mine a new block
///
/// Packages the valid pending transactions plus a reward for the miner,
/// then pushes the block to every peer
#[utoipa::path(
    post,
    path = "/mine",
    params(MineQuery),
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Missing miner or nothing to mine"),
        (status = 409, description = "Chain kept advancing while mining")
    )
)]
pub async fn mine_block(
    blockchain: BlockchainData,
    sync: SyncData,
    query: web::Query<MineQuery>,
) -> Result<HttpResponse, BlockchainError> {
    let miner = query.into_inner().miner.unwrap_or_default();
    let block = blockchain.mine(&miner).await?;

    sync.broadcast_in_background(block.clone());

    Ok(HttpResponse::Ok().json(MineResponse {
        message: "New Block Mined".to_string(),
        block,
    }))
}

/// Check if the blockchain is valid
///
/// Validates the entire blockchain
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.is_valid())
}

/// Create a new wallet
///
/// Creates a new wallet with a random keypair
///
/// The private key must be stored by your own
#[utoipa::path(
    post,
    path = "/createWallet",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet() -> impl Responder {
    let wallet = Wallet::new();

    HttpResponse::Created().json(WalletResponse {
        private_key: wallet.secret_key_hex(),
        public_key: wallet.public_key_hex(),
        address: wallet.address().0.clone(),
    })
}

/// List known peers
#[utoipa::path(
    get,
    path = "/peers",
    responses(
        (status = 200, description = "Peers retrieved successfully", body = Vec<String>)
    )
)]
pub async fn get_peers(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.peers())
}

/// Add a peer
#[utoipa::path(
    post,
    path = "/peers",
    request_body = PeerRequest,
    responses(
        (status = 200, description = "Peer added or already known", body = PeerResponse),
        (status = 400, description = "Invalid URL or own URL")
    )
)]
pub async fn add_peer(
    blockchain: BlockchainData,
    request: web::Json<PeerRequest>,
) -> Result<HttpResponse, BlockchainError> {
    let added = blockchain.add_peer(&request.url)?;

    let message = if added { "Peer added" } else { "Peer already known" };

    Ok(HttpResponse::Ok().json(PeerResponse {
        message: message.to_string(),
        peer: request.into_inner().url,
    }))
}

/// Sync with peers
///
/// Pulls chains and pools from every peer and adopts the longest valid chain
#[utoipa::path(
    post,
    path = "/sync",
    responses(
        (status = 200, description = "Sync finished", body = SyncResponse)
    )
)]
pub async fn sync_with_peers(sync: SyncData) -> impl Responder {
    let report = sync.sync_with_peers().await;

    HttpResponse::Ok().json(SyncResponse {
        message: "Sync finished".to_string(),
        report,
    })
}

/// Receive a block pushed by a peer
///
/// The block is appended only if it extends the local tip
#[utoipa::path(
    post,
    path = "/receive",
    request_body = Block,
    responses(
        (status = 200, description = "Block processed", body = ReceiveResponse)
    )
)]
pub async fn receive_block(blockchain: BlockchainData, block: web::Json<Block>) -> impl Responder {
    let accepted = blockchain.receive_block(block.into_inner());
    HttpResponse::Ok().json(ReceiveResponse { accepted })
}
