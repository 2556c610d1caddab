use serde_json::{json, Value};
use std::sync::Arc;
use venue_service::messaging::validator::predicate;
use venue_service::messaging::{
    BrokerHandler, IncomingMessage, IntentionKind, MemoryBroker, Replier, ReplyOutcome,
};

use crate::common::*;

#[tokio::test]
async fn test_create_request_gets_exactly_one_reply() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let mut replies = broker.subscribe_published();

    handler.on(IntentionKind::Create, |message: IncomingMessage, reply: Replier| async move {
        reply
            .send(json!({
                "msg_id": message.msg_id(),
                "msg_intention": "CREATE",
                "status": 200,
                "result": ["created"]
            }))
            .await;
        Ok(())
    });

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 11, "msg_intention": "CREATE"}));

    let reply = next_reply(&mut replies).await;
    assert_eq!(
        reply,
        json!({"msg_id": 11, "msg_intention": "CREATE", "status": 200, "result": ["created"]})
    );

    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(gateway_replies(&broker).len(), 1);
    assert_eq!(broker.published_to(GATEWAY)[0].routing_key, "");
}

#[tokio::test]
async fn test_valid_reply_is_forwarded_verbatim() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;
    let mut replies = broker.subscribe_published();

    let body = json!({
        "msg_id": 5,
        "msg_intention": "READ",
        "status": 200,
        "result": [{"id": "a", "nested": {"list": [1, 2.5, null, true]}}],
        "unicode": "caf\u{e9}"
    });
    let expected = body.clone();
    handler.on(IntentionKind::Read, move |_: IncomingMessage, reply: Replier| {
        let body = body.clone();
        async move {
            assert_eq!(reply.send(body).await, ReplyOutcome::Published);
            Ok(())
        }
    });

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 5, "msg_intention": "READ"}));

    assert_eq!(next_reply(&mut replies).await, expected);
}

#[tokio::test]
async fn test_invalid_reply_becomes_correlated_fallback() {
    let broker = MemoryBroker::new();
    let handler = BrokerHandler::new(
        messaging_config(),
        accept_all(),
        predicate("has_result", |reply: &Value| reply.get("result").is_some()),
    );
    start_ready(&handler, &broker).await;
    let mut replies = broker.subscribe_published();

    handler.on(IntentionKind::Delete, |_: IncomingMessage, reply: Replier| async move {
        let outcome = reply
            .send(json!({"msg_id": 999, "msg_intention": "SOMETHING_ELSE", "status": 200}))
            .await;
        assert_eq!(outcome, ReplyOutcome::Fallback);
        Ok(())
    });

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 42, "msg_intention": "DELETE"}));

    assert_eq!(
        next_reply(&mut replies).await,
        json!({"msg_id": 42, "msg_intention": "DELETE", "status": 500})
    );
}

#[tokio::test]
async fn test_fallback_for_catch_all_keeps_raw_intention() {
    let broker = MemoryBroker::new();
    let handler = BrokerHandler::new(
        messaging_config(),
        accept_all(),
        Arc::new(venue_service::messaging::validator::FnValidator::new(
            "always_broken",
            |_: &Value| Err(venue_service::messaging::ValidationError::new("schema store offline")),
        )),
    );
    start_ready(&handler, &broker).await;
    let mut replies = broker.subscribe_published();

    handler.on(IntentionKind::Other, |_: IncomingMessage, reply: Replier| async move {
        reply.send(json!({"anything": true})).await;
        Ok(())
    });

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 3, "msg_intention": "ARCHIVE"}));

    assert_eq!(
        next_reply(&mut replies).await,
        json!({"msg_id": 3, "msg_intention": "ARCHIVE", "status": 500})
    );
}

#[tokio::test]
async fn test_send_after_disconnect_publishes_nothing() {
    let broker = MemoryBroker::new();
    let handler = ready_handler(&broker).await;

    broker.close_connections();
    assert!(eventually(|| !handler.is_connected()).await);

    assert_eq!(
        handler.send(Some(1), Some("READ"), json!({"msg_id": 1})).await,
        ReplyOutcome::NoChannel
    );
    assert!(gateway_replies(&broker).is_empty());
}

#[tokio::test]
async fn test_panicking_outgoing_validator_publishes_fallback() {
    let broker = MemoryBroker::new();
    let handler = BrokerHandler::new(
        messaging_config(),
        accept_all(),
        predicate("schema_bug", |_| panic!("schema bug")),
    );
    let errors = collect_errors(&handler);
    start_ready(&handler, &broker).await;
    let mut replies = broker.subscribe_published();

    handler.on(IntentionKind::Create, |_: IncomingMessage, reply: Replier| async move {
        assert_eq!(reply.send(json!({"status": 200})).await, ReplyOutcome::Fallback);
        Ok(())
    });

    send_request(&broker, DETAILS_KEY, &json!({"msg_id": 5, "msg_intention": "CREATE"}));

    assert_eq!(
        next_reply(&mut replies).await,
        json!({"msg_id": 5, "msg_intention": "CREATE", "status": 500})
    );
    tokio::time::sleep(QUIET_PERIOD).await;
    assert!(errors.lock().is_empty());
}

#[tokio::test]
async fn test_fallback_echoes_msg_id_beyond_i64() {
    let broker = MemoryBroker::new();
    let handler = BrokerHandler::new(
        messaging_config(),
        accept_all(),
        predicate("never", |_| false),
    );
    start_ready(&handler, &broker).await;
    let mut replies = broker.subscribe_published();

    handler.on(IntentionKind::Create, |_: IncomingMessage, reply: Replier| async move {
        reply.send(json!({})).await;
        Ok(())
    });

    send_raw(
        &broker,
        DETAILS_KEY,
        br#"{"msg_id": 9223372036854775808, "msg_intention": "CREATE"}"#,
    );

    let reply = next_reply(&mut replies).await;
    assert_eq!(reply["msg_id"].as_u64(), Some(9_223_372_036_854_775_808));
    assert_eq!(reply["msg_intention"], "CREATE");
    assert_eq!(reply["status"], 500);
}
