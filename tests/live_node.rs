//! Live Node Integration Tests
//!
//! These tests need a websocket node at `BSC_WEBSOCKET_URL`, an HTTP endpoint at
//! `BSC_MAINNET_RPC_1` and Redis at localhost:6379. They are marked with #[ignore]
//! by default for CI environments.
//!
//! To run these tests:
//! 1. Export `BSC_WEBSOCKET_URL` and `BSC_MAINNET_RPC_1` (a local `anvil` works for both)
//! 2. Start Redis: `docker run -d -p 6379:6379 redis:alpine`
//! 3. Run tests: `cargo test --test live_node -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::TxHash;
use futures_util::StreamExt;
use riskwatch_mempool::alert::AlertMessage;
use riskwatch_mempool::classifier::{RiskCategory, Severity};
use riskwatch_mempool::config::{ConnectionConfig, DispatchConfig, ThresholdConfig, DEFAULT_REDIS_CHANNEL};
use riskwatch_mempool::dispatcher::AlertDispatcher;
use riskwatch_mempool::ledger::{LedgerClient, TxLookup};
use riskwatch_mempool::monitor::{ConnectionState, Monitor};
use riskwatch_mempool::node::NodeClient;
use riskwatch_mempool::protocol::{parse_ack, subscribe_request, unsubscribe_request};
use riskwatch_mempool::signatures::SignatureTable;
use riskwatch_mempool::sinks::{AlertSink, RedisSink};
use riskwatch_mempool::Alert;
use tokio_util::sync::CancellationToken;

const REDIS_URL: &str = "redis://127.0.0.1:6379";
const PANCAKE_ROUTER_V2: &str = "0x10ED43C718714eb63d5aA57B78B54704E256024E";

/// Connection settings from the environment, if present
fn live_config() -> Option<ConnectionConfig> {
    dotenv::dotenv().ok();
    let ws_url = std::env::var("BSC_WEBSOCKET_URL").ok()?;
    let rpc_url = std::env::var("BSC_MAINNET_RPC_1").ok()?;
    Some(ConnectionConfig::new(ws_url, vec![rpc_url]))
}

// ==================== Node Connection Tests ====================

#[tokio::test]
#[ignore = "Requires a websocket node at BSC_WEBSOCKET_URL"]
async fn test_subscribe_and_unsubscribe() {
    let Some(config) = live_config() else {
        eprintln!("Skipping test: BSC_WEBSOCKET_URL / BSC_MAINNET_RPC_1 not set");
        return;
    };

    let client = NodeClient::new(&config).expect("valid config");
    let mut stream = client.connect().await.expect("Failed to connect");

    stream.send_text(subscribe_request(1)).await.unwrap();
    let ack = stream.next_text().await.expect("stream open").unwrap();
    let subscription = parse_ack(&ack, 1).expect("subscription acknowledged");

    stream.send_text(unsubscribe_request(2, &subscription)).await.unwrap();
    stream.close().await.unwrap();
}

#[tokio::test]
#[ignore = "Requires an HTTP node at BSC_MAINNET_RPC_1"]
async fn test_lookup_unknown_hash_is_not_found() {
    let Some(config) = live_config() else {
        return;
    };

    let client = NodeClient::new(&config).expect("valid config");
    let lookup = client
        .fetch_transaction(TxHash::repeat_byte(0xee))
        .await
        .expect("lookup succeeds");

    assert_eq!(lookup, TxLookup::NotFound);
}

#[tokio::test]
#[ignore = "Requires a websocket node at BSC_WEBSOCKET_URL"]
async fn test_monitor_reaches_subscribed_and_stops_cleanly() {
    let Some(config) = live_config() else {
        return;
    };

    let thresholds = ThresholdConfig::from_settings(PANCAKE_ROUTER_V2, SignatureTable::pancake_v2(), "10", "1")
        .expect("valid thresholds");
    let dispatcher = AlertDispatcher::spawn(Vec::new(), &DispatchConfig::default());
    let client = NodeClient::new(&config).expect("valid config");
    let monitor = Monitor::new(client, Arc::new(thresholds), config, dispatcher.handle());

    let mut status = monitor.status();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(monitor.run(cancel.clone()));

    let subscribed = tokio::time::timeout(Duration::from_secs(15), status.wait_for_state(ConnectionState::Subscribed))
        .await
        .expect("subscribed within 15s");
    assert!(subscribed);

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(status.state(), ConnectionState::Stopped);
    dispatcher.shutdown().await;
}

// ==================== Redis Sink Tests ====================

#[tokio::test]
#[ignore = "Requires running Redis at localhost:6379"]
async fn test_redis_sink_publishes_alert_json() {
    let client = redis::Client::open(REDIS_URL).expect("valid redis url");
    let mut pubsub = match client.get_async_pubsub().await {
        Ok(pubsub) => pubsub,
        Err(e) => {
            eprintln!("Skipping test: Redis not available: {}", e);
            return;
        }
    };
    pubsub.subscribe(DEFAULT_REDIS_CHANNEL).await.unwrap();

    let sink = RedisSink::connect(REDIS_URL, DEFAULT_REDIS_CHANNEL).await.unwrap();
    let alert = Alert {
        tx_hash: TxHash::repeat_byte(0x42),
        category: RiskCategory::LiquidityRemoval,
        severity: Severity::Critical,
        from: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap(),
        to: Some(PANCAKE_ROUTER_V2.parse().unwrap()),
        value: alloy::primitives::utils::parse_ether("2").unwrap(),
        method: "removeLiquidityETH".to_string(),
        method_id: Some("0xaf2979eb".to_string()),
        gas_price: 5_000_000_000,
        timestamp: 1703000000000,
    };
    sink.deliver(&alert).await.unwrap();

    let mut messages = pubsub.on_message();
    let message = tokio::time::timeout(Duration::from_secs(5), messages.next())
        .await
        .expect("message within 5s")
        .expect("pubsub open");
    let payload: String = message.get_payload().unwrap();
    let received = AlertMessage::from_json(&payload).unwrap();

    assert_eq!(received.risk_type, RiskCategory::LiquidityRemoval);
    assert_eq!(received.risk_level, Severity::Critical);
    assert_eq!(received.value_native, "2");
}
