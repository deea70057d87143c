//! Deletion lock for translated items.
//!
//! A translated item may be deleted for three minutes after its translation
//! was last set; after that it is locked. Untranslated items are always
//! deletable. A topic is deletable only when every one of its items is.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::clock::Clock;

/// Length of the window during which a fresh translation can still be deleted.
pub const DELETE_WINDOW_MS: i64 = 3 * 60 * 1000;

/// Cadence of the topic lock watch while something is counting down.
pub const REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Whether an item translated at `updated_at` may be deleted at `now`.
pub fn can_delete(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match updated_at {
        None => true,
        Some(stamp) => (now - stamp).num_milliseconds() <= DELETE_WINDOW_MS,
    }
}

/// Whole seconds (rounded up) until the item locks; 0 once locked or if untranslated.
pub fn time_remaining(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    let Some(stamp) = updated_at else {
        return 0;
    };

    let remaining_ms = DELETE_WINDOW_MS - (now - stamp).num_milliseconds();
    if remaining_ms <= 0 {
        0
    } else {
        ((remaining_ms + 999) / 1000) as u64
    }
}

/// True while a translated item is still counting down towards its lock.
fn in_window(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    updated_at.is_some() && can_delete(updated_at, now)
}

/// Deletion state of a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteLockStatus {
    pub can_delete: bool,
    pub seconds_remaining: u64,
}

pub fn status(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DeleteLockStatus {
    DeleteLockStatus {
        can_delete: can_delete(updated_at, now),
        seconds_remaining: time_remaining(updated_at, now),
    }
}

/// Aggregate deletion state of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicLockStatus {
    pub can_delete: bool,
    /// Translated items already past their window.
    pub locked_items: usize,
    /// Seconds until the next item in the topic locks; 0 if none is counting down.
    pub seconds_remaining: u64,
    /// Present only while some item is still counting down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_after_ms: Option<u64>,
}

pub fn topic_status<I>(stamps: I, now: DateTime<Utc>) -> TopicLockStatus
where
    I: IntoIterator<Item = Option<DateTime<Utc>>>,
{
    let mut locked_items = 0;
    let mut next_lock: Option<u64> = None;

    for stamp in stamps {
        if !can_delete(stamp, now) {
            locked_items += 1;
        } else if in_window(stamp, now) {
            let remaining = time_remaining(stamp, now);
            next_lock = Some(next_lock.map_or(remaining, |n| n.min(remaining)));
        }
    }

    TopicLockStatus {
        can_delete: locked_items == 0,
        locked_items,
        seconds_remaining: next_lock.unwrap_or(0),
        refresh_after_ms: next_lock.map(|_| REFRESH_INTERVAL.as_millis() as u64),
    }
}

/// Re-evaluate a topic's lock every second until nothing in it is counting down.
///
/// The returned receiver sees a new value on every tick. The background task
/// ends once no item remains inside its window or all receivers are dropped;
/// after that `changed()` on the receiver returns an error.
pub fn watch_topic(
    stamps: Vec<Option<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
) -> watch::Receiver<TopicLockStatus> {
    let initial = topic_status(stamps.iter().copied(), clock.now());
    let counting = initial.refresh_after_ms.is_some();
    let (tx, rx) = watch::channel(initial);

    if !counting {
        return rx;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            let next = topic_status(stamps.iter().copied(), clock.now());
            let settled = next.refresh_after_ms.is_none();
            tx.send_replace(next);

            if settled {
                tracing::debug!("Topic lock watch settled");
                break;
            }
        }
    });

    rx
}
