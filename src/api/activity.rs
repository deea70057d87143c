//! Activity calendar endpoint.

use axum::extract::{Query, State};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use super::{success, today, ApiResult};
use crate::errors::AppError;
use crate::models::{summarize_activity, ActivitySummary, ItemKind};
use crate::AppState;

/// Date range for the activity calendar. Defaults to the current month so far.
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// GET /api/activity - Translated items grouped by calendar day.
pub async fn get_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<ActivitySummary> {
    let to = query.to.unwrap_or_else(|| today(&state));
    let from = match query.from {
        Some(from) => from,
        None => to.with_day(1).unwrap_or(to),
    };
    if from > to {
        return Err(AppError::Validation(format!(
            "Range start {} is after its end {}",
            from, to
        )));
    }

    let words = state.repo.list_items(ItemKind::Word, None).await?;
    let sentences = state.repo.list_items(ItemKind::Sentence, None).await?;

    let items = words
        .iter()
        .map(|i| (ItemKind::Word, i))
        .chain(sentences.iter().map(|i| (ItemKind::Sentence, i)));

    success(summarize_activity(
        items,
        state.config.day_boundary,
        from,
        to,
    ))
}
