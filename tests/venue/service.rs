use serde_json::{json, Value};
use venue_service::binding::HealthTraits;

use crate::common::*;

fn first_id(reply: &Value) -> String {
    reply["result"][0]
        .as_str()
        .expect("result carries an id")
        .to_string()
}

#[tokio::test]
async fn test_create_then_read_by_id() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    send_request(&harness.broker, DETAILS_KEY, &create_request(1, "Main Hall", 120));
    let created = next_reply(&mut replies).await;
    assert_eq!(created["msg_id"], 1);
    assert_eq!(created["msg_intention"], "CREATE");
    assert_eq!(created["status"], 200);
    assert_eq!(created["userID"], USER);
    let id = first_id(&created);

    send_request(&harness.broker, DETAILS_KEY, &read_request(2, json!({"id": id})));
    let read = next_reply(&mut replies).await;
    assert_eq!(read["status"], 200);
    assert_eq!(
        read["result"],
        json!([{
            "id": id,
            "name": "Main Hall",
            "capacity": 120,
            "color": "#336699",
            "user": USER
        }])
    );
    assert_eq!(harness.database.len(), 1);
}

#[tokio::test]
async fn test_read_filters_by_capacity_and_name() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    for (msg_id, name, capacity) in [(1, "Small Room", 10), (2, "Big Room", 200), (3, "Theatre", 190)] {
        send_request(&harness.broker, DETAILS_KEY, &create_request(msg_id, name, capacity));
        assert_eq!(next_reply(&mut replies).await["status"], 200);
    }

    send_request(
        &harness.broker,
        DETAILS_KEY,
        &read_request(4, json!({"approximate_capacity": 195, "approximate_fuzziness": 10})),
    );
    let approximate = next_reply(&mut replies).await;
    let names: Vec<&str> = approximate["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|venue| venue["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Big Room", "Theatre"]);

    send_request(&harness.broker, DETAILS_KEY, &read_request(5, json!({"name": "room"})));
    let by_name = next_reply(&mut replies).await;
    assert_eq!(by_name["result"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    send_request(&harness.broker, DETAILS_KEY, &create_request(1, "Main Hall", 120));
    assert_eq!(next_reply(&mut replies).await["status"], 200);

    send_request(&harness.broker, DETAILS_KEY, &create_request(2, "Main Hall", 80));
    let duplicate = next_reply(&mut replies).await;
    assert_eq!(duplicate["msg_id"], 2);
    assert_eq!(duplicate["status"], 405);
    assert_eq!(duplicate["result"], json!(["duplicate venue name"]));
    assert_eq!(harness.database.len(), 1);
}

#[tokio::test]
async fn test_update_and_delete() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    send_request(&harness.broker, DETAILS_KEY, &create_request(1, "Main Hall", 120));
    let id = first_id(&next_reply(&mut replies).await);

    send_request(&harness.broker, DETAILS_KEY, &update_request(2, &id, json!({})));
    let empty = next_reply(&mut replies).await;
    assert_eq!(empty["status"], 405);
    assert_eq!(empty["result"], json!(["no operations provided"]));

    send_request(&harness.broker, DETAILS_KEY, &update_request(3, &id, json!({"capacity": 150})));
    let updated = next_reply(&mut replies).await;
    assert_eq!(updated["status"], 200);
    assert_eq!(updated["result"], json!([id]));

    send_request(&harness.broker, DETAILS_KEY, &delete_request(4, &id));
    let deleted = next_reply(&mut replies).await;
    assert_eq!(deleted["msg_intention"], "DELETE");
    assert_eq!(deleted["status"], 200);
    assert!(harness.database.is_empty());

    send_request(&harness.broker, DETAILS_KEY, &delete_request(5, &id));
    let missing = next_reply(&mut replies).await;
    assert_eq!(missing["status"], 405);
    assert_eq!(missing["result"], json!(["invalid entity ID"]));
}

#[tokio::test]
async fn test_malformed_id_is_an_internal_error() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    send_request(&harness.broker, DETAILS_KEY, &delete_request(7, "not-a-uuid"));
    let reply = next_reply(&mut replies).await;
    assert_eq!(reply["msg_id"], 7);
    assert_eq!(reply["status"], 500);
    assert_eq!(reply["result"], json!(["internal server error"]));
}

#[tokio::test]
async fn test_unknown_intention_is_not_implemented() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    send_request(
        &harness.broker,
        DETAILS_KEY,
        &json!({"msg_id": 9, "msg_intention": "ARCHIVE", "status": 0, "userID": USER}),
    );
    let reply = next_reply(&mut replies).await;
    assert_eq!(reply["msg_id"], 9);
    assert_eq!(reply["msg_intention"], "ARCHIVE");
    assert_eq!(reply["status"], 501);
    assert_eq!(reply["result"], json!([]));
}

#[tokio::test]
async fn test_invalid_create_gets_no_reply() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    let mut incomplete = create_request(1, "Main Hall", 120);
    incomplete.as_object_mut().unwrap().remove("capacity");
    send_request(&harness.broker, DETAILS_KEY, &incomplete);
    send_request(&harness.broker, DETAILS_KEY, &create_request(2, "Side Hall", 40));

    assert_eq!(next_reply(&mut replies).await["msg_id"], 2);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(gateway_replies(&harness.broker).len(), 1);
    assert_eq!(harness.tracker.len(), 1);
}

#[tokio::test]
async fn test_discovery_counts_and_removes_dependents() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    send_request(&harness.broker, DETAILS_KEY, &create_request(1, "Main Hall", 120));
    let id = first_id(&next_reply(&mut replies).await);
    send_request(&harness.broker, DETAILS_KEY, &create_request(2, "Side Hall", 40));
    next_reply(&mut replies).await;

    let discover_user = json!({
        "msg_id": 3, "msg_intention": "READ", "status": 0, "userID": USER,
        "assetType": "user", "assetID": USER
    });
    send_request(&harness.broker, "venues.discovery.discover", &discover_user);
    let user = next_reply(&mut replies).await;
    assert_eq!(user["restrict"], 2);
    assert_eq!(user["modify"], 0);

    let discover_venue = json!({
        "msg_id": 4, "msg_intention": "READ", "status": 0, "userID": USER,
        "assetType": "venue", "assetID": id
    });
    send_request(&harness.broker, "venues.discovery.discover", &discover_venue);
    let venue = next_reply(&mut replies).await;
    assert_eq!(venue["restrict"], 0);
    assert_eq!(venue["modify"], 1);

    let remove_venue = json!({
        "msg_id": 5, "msg_intention": "READ", "status": 0, "userID": USER,
        "assetType": "venue", "assetID": id
    });
    send_request(&harness.broker, "venues.discovery.delete", &remove_venue);
    let removed = next_reply(&mut replies).await;
    assert_eq!(removed["msg_intention"], "DELETE");
    assert_eq!(removed["modified"], 1);
    assert_eq!(removed["successful"], true);
    assert_eq!(harness.database.len(), 1);
}

#[tokio::test]
async fn test_tracker_records_outcomes() {
    let harness = VenueHarness::start().await;
    let mut replies = harness.broker.subscribe_published();

    send_request(&harness.broker, DETAILS_KEY, &create_request(1, "Main Hall", 120));
    next_reply(&mut replies).await;
    send_request(&harness.broker, DETAILS_KEY, &create_request(2, "Main Hall", 120));
    next_reply(&mut replies).await;
    send_request(&harness.broker, DETAILS_KEY, &read_request(3, json!({})));
    next_reply(&mut replies).await;

    assert_eq!(
        harness.tracker.traits(),
        HealthTraits {
            successful: 2,
            fail: 1
        }
    );
}
