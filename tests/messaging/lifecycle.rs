use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use venue_service::messaging::{
    BrokerError, BrokerHandler, ConnectFault, MemoryBroker, MessagingError,
};
use venue_service::state_machine::ConnectionState;

use crate::common::*;

fn handler() -> BrokerHandler {
    BrokerHandler::new(messaging_config(), accept_all(), accept_all())
}

#[tokio::test]
async fn test_ready_callbacks_fire_in_registration_order_once() {
    let broker = MemoryBroker::new();
    let handler = handler();
    let order = Arc::new(Mutex::new(Vec::new()));

    for index in 0..3 {
        let order = order.clone();
        handler.on_ready(move || order.lock().push(index));
    }
    assert!(order.lock().is_empty());

    start_ready(&handler, &broker).await;
    assert_eq!(*order.lock(), vec![0, 1, 2]);

    // Nothing re-fires once the gate is open
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_ready_callback_after_ready_fires_immediately() {
    let broker = MemoryBroker::new();
    let handler = handler();
    start_ready(&handler, &broker).await;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    handler.on_ready(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsubscribed_ready_callback_never_fires() {
    let broker = MemoryBroker::new();
    let handler = handler();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    let subscription = handler.on_ready(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(subscription.unsubscribe());

    start_ready(&handler, &broker).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_rejected_without_error_value() {
    let broker = MemoryBroker::new();
    broker.set_connect_fault(Some(ConnectFault::Unknown));
    let handler = handler();
    let errors = collect_errors(&handler);

    handler.start(broker.clone());
    let result = tokio::time::timeout(EXPECT_WITHIN, handler.wait_until_ready())
        .await
        .expect("wait_until_ready did not resolve");

    assert_eq!(result, Err(BrokerError::UnknownConnect));
    tokio::time::sleep(QUIET_PERIOD).await;

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("Unknown error"));
    assert_eq!(handler.state(), ConnectionState::Errored);
}

#[tokio::test]
async fn test_connector_panic_is_reported_as_unknown_connect() {
    let broker = MemoryBroker::new();
    broker.set_connect_fault(Some(ConnectFault::Panic));
    let handler = handler();
    let errors = collect_errors(&handler);

    handler.start(broker.clone());
    assert!(eventually(|| errors.lock().len() == 1).await);
    assert_eq!(errors.lock()[0], BrokerError::UnknownConnect);
}

#[tokio::test]
async fn test_connect_error_is_surfaced() {
    let broker = MemoryBroker::new();
    broker.set_connect_fault(Some(ConnectFault::Error(MessagingError::connection(
        "ECONNREFUSED",
    ))));
    let handler = handler();
    let errors = collect_errors(&handler);

    handler.start(broker.clone());
    assert!(eventually(|| errors.lock().len() == 1).await);

    let error = errors.lock()[0].clone();
    assert!(matches!(error, BrokerError::Connect(_)));
    assert!(error.to_string().contains("ECONNREFUSED"));
    assert!(!handler.is_ready());
}

#[tokio::test]
async fn test_connection_close_reports_disconnect() {
    let broker = MemoryBroker::new();
    let handler = handler();
    let errors = collect_errors(&handler);
    start_ready(&handler, &broker).await;
    assert!(handler.is_connected());

    broker.close_connections();

    assert!(eventually(|| !handler.is_connected()).await);
    assert_eq!(handler.state(), ConnectionState::Disconnected);
    assert!(eventually(|| errors.lock().contains(&BrokerError::Disconnected)).await);
}

#[tokio::test]
async fn test_connection_error_is_forwarded() {
    let broker = MemoryBroker::new();
    let handler = handler();
    let errors = collect_errors(&handler);
    start_ready(&handler, &broker).await;

    broker.raise_error("heartbeat missed");

    assert!(eventually(|| !errors.lock().is_empty()).await);
    assert!(matches!(
        &errors.lock()[0],
        BrokerError::Connection { message } if message.contains("heartbeat missed")
    ));
    assert!(!handler.is_ready());
    assert!(!handler.is_connected());
    assert_eq!(handler.state(), ConnectionState::Disconnected);
    assert!(matches!(handler.last_error(), Some(BrokerError::Connection { .. })));
}

#[tokio::test]
async fn test_ready_callback_after_connection_loss_is_dropped() {
    let broker = MemoryBroker::new();
    let handler = handler();
    start_ready(&handler, &broker).await;

    broker.close_connections();
    assert!(eventually(|| handler.state() == ConnectionState::Disconnected).await);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let subscription = handler.on_ready(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    // Nothing is left registered for a ready signal that cannot come
    assert!(!subscription.unsubscribe());
    assert!(matches!(
        handler.wait_until_ready().await,
        Err(BrokerError::Disconnected)
    ));
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let broker = MemoryBroker::new();
    let handler = handler();
    start_ready(&handler, &broker).await;

    assert!(!handler.start(broker.clone()));
    assert_eq!(broker.connect_attempts(), 1);
}
