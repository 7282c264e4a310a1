use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// Paths sit at the root so sibling nodes and the web front-end reach the
/// same endpoints.
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/blocks", web::get().to(handlers::get_blocks))
        .route("/tx/{txid}", web::get().to(handlers::get_transaction))
        .route("/balance/{address}", web::get().to(handlers::get_balance))
        .route("/txs/{address}", web::get().to(handlers::get_history))
        .route("/txpool", web::get().to(handlers::get_pending_transactions))
        .route("/add", web::post().to(handlers::add_transaction))
        .route("/signTx", web::post().to(handlers::sign_transaction))
        .route("/faucet", web::post().to(handlers::faucet))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/receive", web::post().to(handlers::receive_block))
        .service(
            web::resource("/mine")
                .route(web::get().to(handlers::mine_block))
                .route(web::post().to(handlers::mine_block)),
        )
        .service(
            web::resource("/sync")
                .route(web::get().to(handlers::sync_with_peers))
                .route(web::post().to(handlers::sync_with_peers)),
        )
        .service(
            web::resource("/createWallet")
                .route(web::get().to(handlers::create_wallet))
                .route(web::post().to(handlers::create_wallet)),
        )
        .service(
            web::resource("/peers")
                .route(web::get().to(handlers::get_peers))
                .route(web::post().to(handlers::add_peer)),
        );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde_json::Value;

    use super::*;
    use crate::blockchain::{Blockchain, Transaction, Wallet};
    use crate::config::NodeConfig;
    use crate::network::{HttpPeerClient, SyncEngine};

    /// A node whose only default peer is itself, so it has no peers
    fn node() -> (Arc<Blockchain>, Arc<SyncEngine>) {
        let blockchain = Arc::new(Blockchain::new(NodeConfig::default()));
        let client = HttpPeerClient::new(Duration::from_millis(200), Duration::from_millis(100)).unwrap();
        let sync = Arc::new(SyncEngine::new(blockchain.clone(), Arc::new(client)));
        (blockchain, sync)
    }

    macro_rules! app {
        ($blockchain:expr, $sync:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from($blockchain.clone()))
                    .app_data(web::Data::from($sync.clone()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_get_blocks_returns_genesis() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let req = test::TestRequest::get().uri("/blocks").to_request();
        let blocks: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(blocks.as_array().unwrap().len(), 1);
        assert_eq!(blocks[0]["prevHash"], "");
        assert_eq!(blocks[0]["txs"][0]["from"], "SYSTEM");
    }

    #[actix_web::test]
    async fn test_faucet_mine_and_balance() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let req = test::TestRequest::post()
            .uri("/faucet")
            .set_json(serde_json::json!({ "to": "alice" }))
            .to_request();
        let queued: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(queued["status"], "queued");
        assert_eq!(queued["amount"], 100.0);

        let req = test::TestRequest::get().uri("/balance/alice").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post().uri("/mine?miner=bob").to_request();
        let mined: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(mined["block"]["index"], 1);

        let req = test::TestRequest::get().uri("/balance/alice").to_request();
        let balance: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(balance["account"], "alice");
        assert_eq!(balance["balance"], 100.0);

        let req = test::TestRequest::get().uri("/balance/bob").to_request();
        let balance: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(balance["balance"], 10.0);

        let txid = queued["txid"].as_str().unwrap();
        let req = test::TestRequest::get().uri(&format!("/tx/{}", txid)).to_request();
        let record: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(record["status"], "confirmed");
        assert_eq!(record["block"], 1);
        assert_eq!(record["timestamp"], record["tx"]["timestamp"]);
        assert!(record["timestamp"].as_i64().unwrap() > 0);
    }

    #[actix_web::test]
    async fn test_mine_errors() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let req = test::TestRequest::get().uri("/mine?miner=bob").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("empty"));

        blockchain.faucet("alice", Some(1.0)).unwrap();
        let req = test::TestRequest::post().uri("/mine").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_sign_tx_flow() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let req = test::TestRequest::post().uri("/createWallet").to_request();
        let wallet: Value = test::call_and_read_body_json(&app, req).await;
        let address = wallet["address"].as_str().unwrap().to_string();
        let private_key = wallet["privateKey"].as_str().unwrap().to_string();
        assert_eq!(wallet["publicKey"].as_str().unwrap().len(), 128);

        blockchain.faucet(&address, Some(50.0)).unwrap();
        blockchain.mine("miner").await.unwrap();

        let req = test::TestRequest::post()
            .uri("/signTx")
            .set_json(serde_json::json!({
                "from": "not-my-address",
                "to": "bob",
                "amount": 5.0,
                "privKey": private_key,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/signTx")
            .set_json(serde_json::json!({
                "from": address,
                "to": "bob",
                "amount": 500.0,
                "privKey": private_key,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/signTx")
            .set_json(serde_json::json!({
                "from": address,
                "to": "bob",
                "amount": 5.0,
                "privKey": private_key,
            }))
            .to_request();
        let signed: Transaction = test::call_and_read_body_json(&app, req).await;
        assert!(signed.verify_signature());

        let req = test::TestRequest::get().uri("/txpool").to_request();
        let pool: Vec<Transaction> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pool, vec![signed.clone()]);

        let req = test::TestRequest::get().uri(&format!("/txs/{}", address)).to_request();
        let history: Value = test::call_and_read_body_json(&app, req).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 2);
        let pending = history
            .iter()
            .find(|r| r["txid"] == signed.txid.as_str())
            .unwrap();
        assert_eq!(pending["status"], "pending");
        assert_eq!(pending["from"], address.as_str());
        assert_eq!(pending["to"], "bob");
        assert_eq!(pending["amount"], 5.0);
        assert_eq!(pending["timestamp"], signed.timestamp);
        assert!(pending.get("tx").is_none());

        let funding = history.iter().find(|r| r["status"] == "confirmed").unwrap();
        assert_eq!(funding["from"], "SYSTEM");
        assert_eq!(funding["amount"], 50.0);
        assert_eq!(funding["block"], 1);
    }

    #[actix_web::test]
    async fn test_add_rejects_foreign_key() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let alice = Wallet::new();
        let mallory = Wallet::new();
        blockchain.faucet(alice.address().as_str(), Some(20.0)).unwrap();
        blockchain.mine("miner").await.unwrap();

        // Signed by mallory, claiming to spend alice's funds
        let mut tx = Transaction::signed(&mallory, "carol".into(), 5.0, 1);
        tx.from = alice.address().clone();
        tx.txid = crate::blockchain::crypto::generate_txid(&tx);

        let req = test::TestRequest::post().uri("/add").set_json(&tx).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().is_some());
        assert!(blockchain.get_pending_transactions().is_empty());
    }

    #[actix_web::test]
    async fn test_add_rejects_tampered_transaction() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let mut tx = Transaction::signed(&Wallet::new(), "bob".into(), 1.0, 1);
        tx.amount = 2.0;

        let req = test::TestRequest::post().uri("/add").set_json(&tx).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(blockchain.get_pending_transactions().is_empty());
    }

    #[actix_web::test]
    async fn test_unknown_transaction_is_not_found() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let req = test::TestRequest::get().uri("/tx/deadbeef").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_receive_ignores_unlinked_block() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let foreign = Blockchain::new(NodeConfig::default());
        foreign.faucet("alice", Some(1.0)).unwrap();
        let block = foreign.mine("miner").await.unwrap();

        let req = test::TestRequest::post().uri("/receive").set_json(&block).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["accepted"], false);
        assert_eq!(blockchain.chain_len(), 1);
    }

    #[actix_web::test]
    async fn test_peers_and_sync() {
        let (blockchain, sync) = node();
        let app = app!(blockchain, sync);

        let req = test::TestRequest::post()
            .uri("/peers")
            .set_json(serde_json::json!({ "url": "http://localhost:8080" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/peers").to_request();
        let peers: Vec<String> = test::call_and_read_body_json(&app, req).await;
        assert!(peers.is_empty());

        let req = test::TestRequest::post().uri("/sync").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["report"]["peers"], 0);
        assert_eq!(body["report"]["chain_length"], 1);
    }
}
