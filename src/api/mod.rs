//! REST API module.
//!
//! Every handler answers with the same envelope: `{success, data}` on success
//! and `{success, error}` through [`AppError`] otherwise.

mod activity;
mod items;
mod progress;
mod topics;

pub use activity::*;
pub use items::*;
pub use progress::*;
pub use topics::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::ItemKind;
use crate::streak::LearningDelta;
use crate::AppState;

/// Tries at a conditional write before giving up with `CONFLICT`.
const WRITE_ATTEMPTS: usize = 5;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Resolve the `{kind}` path segment.
fn item_kind(raw: &str) -> Result<ItemKind, AppError> {
    ItemKind::ALL
        .into_iter()
        .find(|kind| kind.table() == raw)
        .ok_or_else(|| AppError::NotFound(format!("Unknown collection '{}'", raw)))
}

/// Calendar day of the state's clock under the configured boundary.
fn today(state: &AppState) -> NaiveDate {
    state.config.day_boundary.calendar_day(state.clock.now())
}

/// Apply learning events for an item change that is already committed.
///
/// The change stands either way, so a failed save is logged, not returned.
async fn record_learning(state: &AppState, kind: ItemKind, delta: LearningDelta, count: usize) {
    let day = today(state);
    for _ in 0..count {
        if let Err(e) = state.progress.record(kind, delta, day).await {
            tracing::error!(
                "Failed to record {:?} for {}: {}",
                delta,
                kind.table(),
                e
            );
        }
    }
}
