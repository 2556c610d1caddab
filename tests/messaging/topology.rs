use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use venue_service::config::MessagingConfig;
use venue_service::messaging::topology::steps;
use venue_service::messaging::{
    BrokerError, BrokerHandler, ExchangeKind, IncomingMessage, IntentionKind, MemoryBroker,
    Replier,
};

use crate::common::*;

#[tokio::test]
async fn test_handler_builds_full_topology() {
    let broker = MemoryBroker::new();
    let config = MessagingConfig::new(
        GATEWAY,
        REQUEST,
        INBOX,
        vec![
            "venues.details.*".to_string(),
            "venues.discovery.#".to_string(),
            "venues.details.*".to_string(),
        ],
    );
    let handler = BrokerHandler::new(config, accept_all(), accept_all());
    start_ready(&handler, &broker).await;

    assert_eq!(broker.exchange_kind(GATEWAY), Some(ExchangeKind::Direct));
    assert_eq!(broker.exchange_kind(REQUEST), Some(ExchangeKind::Topic));
    assert!(broker.exchange_options(GATEWAY).unwrap().durable);
    assert!(!broker.exchange_options(REQUEST).unwrap().durable);
    assert!(!broker.queue_options(INBOX).unwrap().exclusive);
    assert_eq!(
        broker.bindings(INBOX),
        vec![
            (REQUEST.to_string(), "venues.details.*".to_string()),
            (REQUEST.to_string(), "venues.discovery.#".to_string()),
        ]
    );
    assert_eq!(broker.consumer_count(INBOX), 1);
}

#[tokio::test]
async fn test_failing_binding_reports_topology_error() {
    let broker = MemoryBroker::new();
    broker.fail_operation("bind_queue");
    let handler = BrokerHandler::new(messaging_config(), accept_all(), accept_all());
    let errors = collect_errors(&handler);

    handler.start(broker.clone());
    let result = tokio::time::timeout(EXPECT_WITHIN, handler.wait_until_ready())
        .await
        .expect("wait_until_ready did not resolve");

    match result {
        Err(BrokerError::Topology { step, .. }) => assert_eq!(step, steps::BIND_TOPICS),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(errors.lock().len(), 1);
    assert!(!handler.is_ready());
    assert_eq!(broker.consumer_count(INBOX), 0);
}

#[tokio::test]
async fn test_exchange_kind_conflict_fails_setup() {
    let broker = MemoryBroker::new();
    // Another service already declared the gateway with a different kind
    let other = BrokerHandler::new(
        MessagingConfig::new("shared", GATEWAY, "other-inbox", vec![]),
        accept_all(),
        accept_all(),
    );
    start_ready(&other, &broker).await;

    let handler = BrokerHandler::new(messaging_config(), accept_all(), accept_all());
    handler.start(broker.clone());
    let result = tokio::time::timeout(EXPECT_WITHIN, handler.wait_until_ready())
        .await
        .expect("wait_until_ready did not resolve");

    match result {
        Err(BrokerError::Topology { step, .. }) => assert_eq!(step, steps::GATEWAY_EXCHANGE),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_instances_share_the_inbox() {
    let broker = MemoryBroker::new();
    let first = ready_handler(&broker).await;
    let second = ready_handler(&broker).await;
    assert_eq!(broker.consumer_count(INBOX), 2);

    let handled = Arc::new(AtomicUsize::new(0));
    for handler in [&first, &second] {
        let handled = handled.clone();
        handler.on(IntentionKind::Read, move |_: IncomingMessage, _: Replier| {
            handled.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }

    for msg_id in 0..4 {
        send_request(&broker, DETAILS_KEY, &json!({"msg_id": msg_id, "msg_intention": "READ"}));
    }

    // Each request is consumed by exactly one instance
    assert!(eventually(|| handled.load(Ordering::SeqCst) == 4).await);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(handled.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_unbound_routing_key_is_not_delivered() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let handled = Arc::new(AtomicUsize::new(0));
    {
        let handled = handled.clone();
        handler.on(IntentionKind::Read, move |_: IncomingMessage, _: Replier| {
            handled.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }

    send_request(&broker, "rooms.details.get", &json!({"msg_id": 1, "msg_intention": "READ"}));
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 2, "msg_intention": "READ"}));

    assert!(eventually(|| handled.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}
