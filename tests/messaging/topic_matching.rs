use proptest::prelude::*;
use venue_service::messaging::memory::topic_matches;

#[test]
fn test_topic_wildcards() {
    assert!(topic_matches("venues.details.*", "venues.details.get"));
    assert!(!topic_matches("venues.details.*", "venues.details"));
    assert!(!topic_matches("venues.details.*", "venues.details.get.all"));
    assert!(topic_matches("venues.#", "venues"));
    assert!(topic_matches("venues.#", "venues.details.get.all"));
    assert!(topic_matches("#", "anything.at.all"));
    assert!(topic_matches("*.details.#", "rooms.details"));
    assert!(!topic_matches("venues.*", "rooms.get"));
}

fn word() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

proptest! {
    #[test]
    fn prop_literal_pattern_matches_itself(words in prop::collection::vec(word(), 1..5)) {
        let key = words.join(".");
        prop_assert!(topic_matches(&key, &key));
    }

    #[test]
    fn prop_hash_matches_every_key(words in prop::collection::vec(word(), 0..5)) {
        prop_assert!(topic_matches("#", &words.join(".")));
    }

    #[test]
    fn prop_star_matches_exactly_one_word(
        prefix in prop::collection::vec(word(), 1..4),
        middle in word(),
        extra in word(),
    ) {
        let pattern = format!("{}.*", prefix.join("."));
        let key = format!("{}.{middle}", prefix.join("."));
        prop_assert!(topic_matches(&pattern, &key));
        prop_assert!(!topic_matches(&pattern, &prefix.join(".")));
        let longer = format!("{key}.{extra}");
        prop_assert!(!topic_matches(&pattern, &longer));
    }
}
