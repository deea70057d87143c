//! Word and sentence API endpoints.
//!
//! Writes go to SQLite first. The streak record follows and the remote copy is
//! queued. Changes to an existing row are conditional on the row read, so two
//! concurrent requests can never both claim the same transition.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{item_kind, record_learning, success, ApiResult, WRITE_ATTEMPTS};
use crate::errors::AppError;
use crate::models::{
    CreateItemRequest, ItemKind, ItemView, LearningItem, UpdateTranslationRequest,
};
use crate::streak::LearningDelta;
use crate::AppState;

/// Query parameters for listing items.
#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub topic: Option<String>,
}

/// GET /api/:kind/items - List items, optionally for one topic.
pub async fn list_items(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ItemQuery>,
) -> ApiResult<Vec<ItemView>> {
    let kind = item_kind(&kind)?;
    let items = state.repo.list_items(kind, query.topic.as_deref()).await?;

    let now = state.clock.now();
    success(items.into_iter().map(|i| ItemView::new(i, now)).collect())
}

/// GET /api/:kind/items/:id - Get a single item.
pub async fn get_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<ItemView> {
    let kind = item_kind(&kind)?;
    let item = load_item(&state, kind, &id).await?;

    success(ItemView::new(item, state.clock.now()))
}

/// POST /api/:kind/items - Add a new item, translated or not.
pub async fn create_item(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    payload: Result<Json<CreateItemRequest>, JsonRejection>,
) -> ApiResult<ItemView> {
    let kind = item_kind(&kind)?;
    let Json(request) = payload?;

    let english = request.english.trim();
    if english.is_empty() {
        return Err(AppError::Validation("English text is required".to_string()));
    }
    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(AppError::Validation("Topic is required".to_string()));
    }

    let now = state.clock.now();
    let item = LearningItem::new(
        english.to_string(),
        request.tamil.trim().to_string(),
        topic.to_string(),
        now,
    );
    state.repo.insert_item(kind, &item).await?;
    tracing::info!("Added {} {} to topic '{}'", kind.label(), item.id, item.topic);

    match serde_json::to_value(&item) {
        Ok(record) => state.mirror.enqueue_insert(kind.table(), record),
        Err(e) => tracing::warn!("Could not encode {} {} for the remote: {}", kind.label(), item.id, e),
    }

    if item.is_translated() {
        record_learning(&state, kind, LearningDelta::Learned, 1).await;
    }

    success(ItemView::new(item, now))
}

/// PUT /api/:kind/items/:id - Set or clear an item's translation.
pub async fn update_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    payload: Result<Json<UpdateTranslationRequest>, JsonRejection>,
) -> ApiResult<ItemView> {
    let kind = item_kind(&kind)?;
    let Json(request) = payload?;
    let tamil = request.tamil.trim();

    for _ in 0..WRITE_ATTEMPTS {
        let current = load_item(&state, kind, &id).await?;
        let now = state.clock.now();
        if tamil == current.translated_text {
            return success(ItemView::new(current, now));
        }

        let mut next = current.clone();
        let delta = next.set_translation(tamil.to_string(), now);
        if !state.repo.save_translation(kind, &current, &next).await? {
            tracing::debug!("{} {} changed underneath, retrying", kind.label(), id);
            continue;
        }
        tracing::debug!("Translation of {} {} changed ({:?})", kind.label(), id, delta);

        state.mirror.enqueue_update(
            kind.table(),
            &id,
            json!({
                "tamil": next.translated_text,
                "updated_at": next.updated_at,
            }),
        );

        if let Some(delta) = delta {
            record_learning(&state, kind, delta, 1).await;
        }

        return success(ItemView::new(next, now));
    }

    Err(conflict(kind, &id))
}

/// DELETE /api/:kind/items/:id - Delete an item unless its translation is locked.
pub async fn delete_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<()> {
    let kind = item_kind(&kind)?;

    for _ in 0..WRITE_ATTEMPTS {
        let current = load_item(&state, kind, &id).await?;

        if !current.delete_lock(state.clock.now()).can_delete {
            return Err(AppError::DeleteLocked(format!(
                "{} {} was translated more than three minutes ago and can no longer be deleted",
                kind.label(),
                id
            )));
        }

        if !state.repo.delete_item(kind, &current).await? {
            tracing::debug!("{} {} changed underneath, retrying", kind.label(), id);
            continue;
        }
        tracing::info!("Deleted {} {}", kind.label(), id);
        state.mirror.enqueue_delete(kind.table(), &id);

        if current.is_translated() {
            record_learning(&state, kind, LearningDelta::Unlearned, 1).await;
        }

        return success(());
    }

    Err(conflict(kind, &id))
}

async fn load_item(state: &AppState, kind: ItemKind, id: &str) -> Result<LearningItem, AppError> {
    state
        .repo
        .get_item(kind, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind.label(), id)))
}

fn conflict(kind: ItemKind, id: &str) -> AppError {
    AppError::Conflict(format!(
        "{} {} is being changed by another request; try again",
        kind.label(),
        id
    ))
}
