//! Topic projection over the item collection.
//!
//! Topics are never stored. They exist only as the distinct `topic` values of
//! the items, so deleting the last item of a topic removes the topic with it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::LearningItem;
use crate::lock::{self, TopicLockStatus};

/// Counts and deletion state for one topic.
#[derive(Debug, Clone, Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub count: usize,
    /// Items still waiting for a translation.
    pub pending_count: usize,
    pub is_complete: bool,
    pub delete_lock: TopicLockStatus,
}

/// Group items by topic name, sorted by name.
pub fn derive_topics(items: &[LearningItem], now: DateTime<Utc>) -> Vec<TopicSummary> {
    let mut grouped: BTreeMap<&str, Vec<&LearningItem>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.topic.as_str()).or_default().push(item);
    }

    grouped
        .into_iter()
        .map(|(name, members)| summarize(name, &members, now))
        .collect()
}

fn summarize(name: &str, items: &[&LearningItem], now: DateTime<Utc>) -> TopicSummary {
    let pending_count = items.iter().filter(|i| !i.is_translated()).count();
    let delete_lock = lock::topic_status(items.iter().map(|i| i.updated_at), now);

    TopicSummary {
        name: name.to_string(),
        count: items.len(),
        pending_count,
        is_complete: !items.is_empty() && pending_count == 0,
        delete_lock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn item(topic: &str, tamil: &str, translated_ago: Option<i64>) -> LearningItem {
        let mut item = LearningItem::new("x".into(), tamil.into(), topic.into(), now());
        item.updated_at = translated_ago.map(|s| now() - Duration::seconds(s));
        item
    }

    #[test]
    fn test_derive_topics_counts_and_sorts() {
        let items = vec![
            item("Numbers", "Onru", Some(3_600)),
            item("Greetings", "", None),
            item("Numbers", "", None),
            item("Greetings", "Vanakkam", Some(3_600)),
            item("Fruits", "Maambazham", Some(3_600)),
        ];

        let topics = derive_topics(&items, now());
        let names: Vec<_> = topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Fruits", "Greetings", "Numbers"]);

        let numbers = &topics[2];
        assert_eq!(numbers.count, 2);
        assert_eq!(numbers.pending_count, 1);
        assert!(!numbers.is_complete);

        assert!(topics[0].is_complete);
        assert!(!topics[0].delete_lock.can_delete);
    }

    #[test]
    fn test_one_old_translation_locks_the_topic() {
        let items = vec![
            item("Numbers", "Onru", Some(10)),
            item("Numbers", "Irandu", Some(3_600)),
            item("Numbers", "", None),
        ];

        let topics = derive_topics(&items, now());
        assert!(!topics[0].delete_lock.can_delete);
        assert_eq!(topics[0].delete_lock.locked_items, 1);
    }

    #[test]
    fn test_fresh_translations_keep_the_topic_deletable() {
        let items = vec![item("Fruits", "Maambazham", Some(10)), item("Fruits", "", None)];

        let topics = derive_topics(&items, now());
        assert!(topics[0].delete_lock.can_delete);
        assert_eq!(topics[0].delete_lock.seconds_remaining, 170);
        assert_eq!(topics[0].delete_lock.refresh_after_ms, Some(1_000));
    }

    #[test]
    fn test_empty_collection_has_no_topics() {
        assert!(derive_topics(&[], now()).is_empty());
    }
}
