use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use venue_service::messaging::validator::predicate;
use venue_service::messaging::{
    BrokerError, BrokerHandler, IncomingMessage, IntentionKind, MemoryBroker, Replier,
};

use crate::common::*;

fn count_dispatches(handler: &BrokerHandler) -> Arc<HashMap<IntentionKind, AtomicUsize>> {
    let counters: Arc<HashMap<IntentionKind, AtomicUsize>> = Arc::new(
        IntentionKind::ALL
            .iter()
            .map(|kind| (*kind, AtomicUsize::new(0)))
            .collect(),
    );

    for kind in IntentionKind::ALL {
        let counters = counters.clone();
        handler.on(kind, move |_: IncomingMessage, _: Replier| {
            counters[&kind].fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }
    counters
}

fn total(counters: &HashMap<IntentionKind, AtomicUsize>) -> usize {
    counters.values().map(|c| c.load(Ordering::SeqCst)).sum()
}

#[tokio::test]
async fn test_each_intention_reaches_exactly_its_handler() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let counters = count_dispatches(&handler);

    for (msg_id, intention) in ["CREATE", "READ", "UPDATE", "DELETE"].iter().enumerate() {
        send_request(
            &broker,
            DETAILS_KEY,
            &json!({"msg_id": msg_id, "msg_intention": intention}),
        );
    }

    assert!(eventually(|| total(&counters) == 4).await);
    for kind in [
        IntentionKind::Create,
        IntentionKind::Read,
        IntentionKind::Update,
        IntentionKind::Delete,
    ] {
        assert_eq!(counters[&kind].load(Ordering::SeqCst), 1, "{kind}");
    }
    assert_eq!(counters[&IntentionKind::Other].load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_or_missing_intention_goes_to_catch_all() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let counters = count_dispatches(&handler);

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 1, "msg_intention": "ARCHIVE"}));
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 2, "msg_intention": "create"}));
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 3}));

    assert!(eventually(|| total(&counters) == 3).await);
    assert_eq!(counters[&IntentionKind::Other].load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_once_listener_fires_at_most_once() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;

    let once_calls = Arc::new(AtomicUsize::new(0));
    let persistent_calls = Arc::new(AtomicUsize::new(0));
    {
        let once_calls = once_calls.clone();
        handler.once(IntentionKind::Create, move |_: IncomingMessage, _: Replier| {
            once_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }
    {
        let persistent_calls = persistent_calls.clone();
        handler.on(IntentionKind::Create, move |_: IncomingMessage, _: Replier| {
            persistent_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 1, "msg_intention": "CREATE"}));
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 2, "msg_intention": "CREATE"}));

    assert!(eventually(|| persistent_calls.load(Ordering::SeqCst) == 2).await);
    assert_eq!(once_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsubscribed_listener_is_not_invoked() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;

    let removed_calls = Arc::new(AtomicUsize::new(0));
    let kept_calls = Arc::new(AtomicUsize::new(0));
    let subscription = {
        let removed_calls = removed_calls.clone();
        handler.on(IntentionKind::Delete, move |_: IncomingMessage, _: Replier| {
            removed_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
    };
    {
        let kept_calls = kept_calls.clone();
        handler.on(IntentionKind::Delete, move |_: IncomingMessage, _: Replier| {
            kept_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }
    assert!(subscription.unsubscribe());

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 1, "msg_intention": "DELETE"}));

    assert!(eventually(|| kept_calls.load(Ordering::SeqCst) == 1).await);
    assert_eq!(removed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_undecodable_payload_is_dropped() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let counters = count_dispatches(&handler);
    handler.on(IntentionKind::Read, |message: IncomingMessage, reply: Replier| async move {
        reply
            .send(json!({"msg_id": message.msg_id(), "msg_intention": "READ", "status": 200}))
            .await;
        Ok(())
    });

    send_raw(&broker, DETAILS_KEY, b"{\"msg_id\": 1, \"msg_intention\": \"REA");
    send_raw(&broker, DETAILS_KEY, b"not json at all");
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 2, "msg_intention": "READ"}));

    assert!(eventually(|| gateway_replies(&broker).len() == 1).await);
    tokio::time::sleep(QUIET_PERIOD).await;

    assert_eq!(total(&counters), 1);
    let replies = gateway_replies(&broker);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["msg_id"], json!(2));
}

#[tokio::test]
async fn test_message_failing_incoming_validation_is_dropped() {
    let broker = MemoryBroker::new();
    let handler = BrokerHandler::new(
        messaging_config(),
        venue_service::messaging::validator::predicate("has_user", |m| m.get("userID").is_some()),
        accept_all(),
    );
    start_ready(&handler, &broker).await;
    let counters = count_dispatches(&handler);

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 1, "msg_intention": "CREATE"}));
    send_request(
        &broker,
        DETAILS_KEY,
        &json!({"msg_id": 2, "msg_intention": "CREATE", "userID": "u"}),
    );

    assert!(eventually(|| total(&counters) == 1).await);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(total(&counters), 1);
    assert!(gateway_replies(&broker).is_empty());
}

#[tokio::test]
async fn test_failing_handler_raises_one_error_and_processing_continues() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let errors = collect_errors(&handler);

    handler.on(IntentionKind::Update, |message: IncomingMessage, reply: Replier| async move {
        if message.msg_id().as_i64() == Some(1) {
            anyhow::bail!("storage unavailable");
        }
        reply
            .send(json!({"msg_id": message.msg_id(), "msg_intention": "UPDATE", "status": 200}))
            .await;
        Ok(())
    });

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 1, "msg_intention": "UPDATE"}));
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 2, "msg_intention": "UPDATE"}));

    assert!(eventually(|| gateway_replies(&broker).len() == 1).await);
    tokio::time::sleep(QUIET_PERIOD).await;

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        BrokerError::HandlerFailed { message, .. } => assert!(message.contains("storage unavailable")),
        other => panic!("unexpected error event: {other:?}"),
    }
    assert_eq!(gateway_replies(&broker)[0]["msg_id"], json!(2));
}

#[tokio::test]
async fn test_panicking_handler_raises_one_error() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let errors = collect_errors(&handler);
    let survivors = Arc::new(AtomicUsize::new(0));

    handler.on(IntentionKind::Create, |_: IncomingMessage, _: Replier| async {
        panic!("handler exploded");
    });
    {
        let survivors = survivors.clone();
        handler.on(IntentionKind::Read, move |_: IncomingMessage, _: Replier| {
            survivors.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 1, "msg_intention": "CREATE"}));
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 2, "msg_intention": "READ"}));

    assert!(eventually(|| survivors.load(Ordering::SeqCst) == 1).await);
    assert!(eventually(|| errors.lock().len() == 1).await);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(errors.lock().len(), 1);
}

#[tokio::test]
async fn test_panicking_incoming_validator_drops_only_that_message() {
    let broker = MemoryBroker::new();
    let handler = BrokerHandler::new(
        messaging_config(),
        predicate("explodes_on_boom", |message| {
            if message.get("boom").is_some() {
                panic!("validator bug");
            }
            true
        }),
        accept_all(),
    );
    let errors = collect_errors(&handler);
    start_ready(&handler, &broker).await;
    let counters = count_dispatches(&handler);

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 1, "msg_intention": "CREATE", "boom": 1}));
    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 2, "msg_intention": "CREATE"}));

    assert!(eventually(|| counters[&IntentionKind::Create].load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(total(&counters), 1);
    assert!(handler.is_ready());
    assert!(errors.lock().is_empty());
}
