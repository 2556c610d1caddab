//! Memory broker helpers shared by the integration tests

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use venue_service::config::MessagingConfig;
use venue_service::messaging::transport::Delivery;
use venue_service::messaging::validator::{AcceptAll, SharedValidator};
use venue_service::messaging::{BrokerError, BrokerHandler, MemoryBroker};

pub const GATEWAY: &str = "gateway";
pub const REQUEST: &str = "request";
pub const INBOX: &str = "venues";
pub const DETAILS_KEY: &str = "venues.details.get";

/// How long to wait for something that is expected to happen
pub const EXPECT_WITHIN: Duration = Duration::from_secs(2);

/// How long to wait before concluding something did not happen
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

pub fn messaging_config() -> MessagingConfig {
    MessagingConfig::new(
        GATEWAY,
        REQUEST,
        INBOX,
        vec!["venues.details.*".to_string(), "venues.discovery.*".to_string()],
    )
}

pub fn accept_all() -> SharedValidator {
    Arc::new(AcceptAll)
}

/// Start `handler` against `broker` and wait for it to become ready
pub async fn start_ready(handler: &BrokerHandler, broker: &MemoryBroker) {
    assert!(handler.start(broker.clone()));
    tokio::time::timeout(EXPECT_WITHIN, handler.wait_until_ready())
        .await
        .expect("handler did not become ready in time")
        .expect("handler failed to become ready");
}

/// A ready handler with permissive validators
pub async fn ready_handler(broker: &MemoryBroker) -> BrokerHandler {
    let handler = BrokerHandler::new(messaging_config(), accept_all(), accept_all());
    start_ready(&handler, broker).await;
    handler
}

pub fn send_request(broker: &MemoryBroker, routing_key: &str, body: &Value) {
    broker
        .publish(REQUEST, routing_key, serde_json::to_vec(body).unwrap())
        .expect("request exchange exists");
}

pub fn send_raw(broker: &MemoryBroker, routing_key: &str, payload: &'static [u8]) {
    broker
        .publish(REQUEST, routing_key, payload)
        .expect("request exchange exists");
}

/// Next message published to the gateway exchange
pub async fn next_reply(replies: &mut broadcast::Receiver<Delivery>) -> Value {
    let deadline = tokio::time::Instant::now() + EXPECT_WITHIN;
    loop {
        let delivery = tokio::time::timeout_at(deadline, replies.recv())
            .await
            .expect("no reply published in time")
            .expect("published stream closed");
        if delivery.exchange == GATEWAY {
            return serde_json::from_slice(&delivery.payload).expect("reply is JSON");
        }
    }
}

/// Replies published to the gateway so far
pub fn gateway_replies(broker: &MemoryBroker) -> Vec<Value> {
    broker
        .published_to(GATEWAY)
        .iter()
        .map(|delivery| serde_json::from_slice(&delivery.payload).expect("reply is JSON"))
        .collect()
}

/// Collects every error event raised by a handler
pub fn collect_errors(handler: &BrokerHandler) -> Arc<parking_lot::Mutex<Vec<BrokerError>>> {
    let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = errors.clone();
    handler.on_error(move |e: &BrokerError| sink.lock().push(e.clone()));
    errors
}

/// Poll `condition` until it holds or the expectation window passes
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + EXPECT_WITHIN;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
