//! Progress API endpoint.

use axum::extract::State;

use super::{success, today, ApiResult};
use crate::models::StreakData;
use crate::AppState;

/// GET /api/progress - Streak and learned totals, expired first if stale.
pub async fn get_progress(State(state): State<AppState>) -> ApiResult<StreakData> {
    let data = state.progress.refresh(today(&state)).await?;
    success(data)
}
