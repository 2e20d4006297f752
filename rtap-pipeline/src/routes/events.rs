use axum::extract::{Query, State};
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use rtap_shared::errors::{AppError, AppResult};
use rtap_shared::types::ApiResponse;

use crate::models::RawEvent;
use crate::schema::events_raw;
use crate::AppState;

const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct RecentEventsQuery {
    pub limit: Option<i64>,
}

/// GET /events/recent?limit=50
/// Most recent raw events, newest first. `events_raw` is produced upstream;
/// this surface is read-only.
pub async fn get_recent_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentEventsQuery>,
) -> AppResult<Json<ApiResponse<Vec<RawEvent>>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_LIMIT);

    let mut conn = state
        .db
        .get()
        .map_err(|e| AppError::internal(format!("db pool error: {e}")))?;

    let events: Vec<RawEvent> = events_raw::table
        .order(events_raw::occurred_at.desc())
        .limit(limit)
        .load(&mut conn)?;

    Ok(Json(ApiResponse::ok(events)))
}
