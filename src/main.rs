use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod network;

use blockchain::{Blockchain, BlockchainError};
use config::{Cli, NodeConfig};
use network::{HttpPeerClient, SyncEngine};

// Load the blockchain from storage, falling back to memory when the database
// cannot be opened. A stored chain that fails validation stops the node.
fn initialize_blockchain(config: &NodeConfig) -> anyhow::Result<Blockchain> {
    let data_dir = config.data_dir();

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match Blockchain::with_storage(&data_dir, config.clone()) {
        Ok(blockchain) => {
            info!("Loaded blockchain from storage at {}", data_dir.display());
            Ok(blockchain)
        }
        Err(err @ BlockchainError::InvalidChain(_)) => Err(err)
            .with_context(|| format!("refusing to start with the chain in {}", data_dir.display())),
        Err(err) => {
            warn!("Failed to load blockchain from storage: {}", err);
            warn!("Creating in-memory blockchain instead");
            Ok(Blockchain::new(config.clone()))
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_blocks,
        api::handlers::get_transaction,
        api::handlers::get_balance,
        api::handlers::get_history,
        api::handlers::get_pending_transactions,
        api::handlers::add_transaction,
        api::handlers::sign_transaction,
        api::handlers::faucet,
        api::handlers::mine_block,
        api::handlers::validate_chain,
        api::handlers::create_wallet,
        api::handlers::get_peers,
        api::handlers::add_peer,
        api::handlers::sync_with_peers,
        api::handlers::receive_block
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::TransactionRecord,
            blockchain::HistoryEntry,
            blockchain::TxStatus,
            network::SyncReport,
            api::schema::MineResponse,
            api::schema::SubmitResponse,
            api::schema::FaucetRequest,
            api::schema::FaucetResponse,
            api::schema::SignTxRequest,
            api::schema::WalletResponse,
            api::schema::BalanceResponse,
            api::schema::PeerRequest,
            api::schema::PeerResponse,
            api::schema::SyncResponse,
            api::schema::ReceiveResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node API endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "1.0.0",
        description = "A proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from(Cli::parse());
    let port = config.port;

    let blockchain = Arc::new(initialize_blockchain(&config)?);
    let client = HttpPeerClient::new(config.peer_timeout, config.peer_connect_timeout)
        .context("failed to build the peer client")?;
    let sync = Arc::new(SyncEngine::new(blockchain.clone(), Arc::new(client)));

    info!("Known peers: {:?}", blockchain.peers());
    let periodic_sync = sync.spawn_periodic(config.sync_interval);

    info!("Starting HTTP server at {}", config.self_url());

    let blockchain_data = web::Data::from(blockchain.clone());
    let sync_data = web::Data::from(sync.clone());

    // Start HTTP server
    let result = HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain_data.clone())
            .app_data(sync_data.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind(("127.0.0.1", port))
    .with_context(|| format!("failed to bind port {}", port))?
    .run()
    .await;

    info!("Shutting down");
    blockchain.shutdown();
    periodic_sync.abort();

    result.context("HTTP server failed")
}
