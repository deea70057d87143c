//! Topic API endpoints.
//!
//! Topics are derived from the items on every request.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use super::{item_kind, record_learning, success, ApiResult, WRITE_ATTEMPTS};
use crate::errors::AppError;
use crate::lock::{self, TopicLockStatus};
use crate::models::{derive_topics, ItemKind, LearningItem, TopicSummary};
use crate::streak::LearningDelta;
use crate::AppState;

/// Longest a lock request with `wait=true` is held open.
const LOCK_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters for the topic lock endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LockQuery {
    #[serde(default)]
    pub wait: bool,
}

/// Result of deleting a topic.
#[derive(Debug, Serialize)]
pub struct TopicDeleted {
    pub name: String,
    pub removed_items: usize,
}

/// GET /api/:kind/topics - List topics with counts and lock state.
pub async fn list_topics(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Vec<TopicSummary>> {
    let kind = item_kind(&kind)?;
    let items = state.repo.list_items(kind, None).await?;
    success(derive_topics(&items, state.clock.now()))
}

/// GET /api/:kind/topics/:name/lock - Current lock state of a topic.
///
/// With `wait=true` the response is held until the next refresh tick while an
/// item is still counting down, so a client can poll without its own timer.
pub async fn topic_lock(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
    Query(query): Query<LockQuery>,
) -> ApiResult<TopicLockStatus> {
    let kind = item_kind(&kind)?;
    let items = topic_items(&state, kind, &name).await?;
    let stamps: Vec<_> = items.iter().map(|i| i.updated_at).collect();

    if !query.wait {
        return success(lock::topic_status(stamps, state.clock.now()));
    }

    let mut rx = lock::watch_topic(stamps, state.clock.clone());
    if rx.borrow().refresh_after_ms.is_some() {
        // A closed channel or an elapsed timeout both fall through to the latest value.
        let _ = tokio::time::timeout(LOCK_POLL_TIMEOUT, rx.changed()).await;
    }

    let status = rx.borrow().clone();
    success(status)
}

/// DELETE /api/:kind/topics/:name - Delete every item of a topic.
pub async fn delete_topic(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<TopicDeleted> {
    let kind = item_kind(&kind)?;

    for _ in 0..WRITE_ATTEMPTS {
        let items = topic_items(&state, kind, &name).await?;

        let status = lock::topic_status(items.iter().map(|i| i.updated_at), state.clock.now());
        if !status.can_delete {
            return Err(AppError::DeleteLocked(format!(
                "Topic '{}' has {} locked {}",
                name,
                status.locked_items,
                if status.locked_items == 1 { "item" } else { "items" }
            )));
        }

        if !state.repo.delete_topic(kind, &name, &items).await? {
            tracing::debug!("Topic '{}' changed underneath, retrying", name);
            continue;
        }
        tracing::info!("Deleted topic '{}' with {} items", name, items.len());

        for item in &items {
            state.mirror.enqueue_delete(kind.table(), &item.id);
        }
        let translated = items.iter().filter(|i| i.is_translated()).count();
        record_learning(&state, kind, LearningDelta::Unlearned, translated).await;

        return success(TopicDeleted {
            name,
            removed_items: items.len(),
        });
    }

    Err(AppError::Conflict(format!(
        "Topic '{}' is being changed by another request; try again",
        name
    )))
}

async fn topic_items(
    state: &AppState,
    kind: ItemKind,
    name: &str,
) -> Result<Vec<LearningItem>, AppError> {
    let items = state.repo.list_items(kind, Some(name)).await?;
    if items.is_empty() {
        return Err(AppError::NotFound(format!("Topic '{}' not found", name)));
    }
    Ok(items)
}
