use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use rtap_shared::errors::{AppError, AppResult};
use rtap_shared::types::ApiResponse;

use crate::models::DailyMetric;
use crate::schema::metrics_daily;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DailyMetricsQuery {
    /// Metric name, e.g. EVENTS_TOTAL or DAU
    pub name: String,
    /// Start date in YYYY-MM-DD format
    pub from: String,
    /// End date in YYYY-MM-DD format
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub points: Vec<DailyMetric>,
}

/// GET /metrics/daily?name=DAU&from=2025-01-01&to=2025-01-31
/// Returns the persisted daily values of one metric within the date range.
pub async fn get_daily_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DailyMetricsQuery>,
) -> AppResult<Json<ApiResponse<MetricSeries>>> {
    let from = NaiveDate::parse_from_str(&query.from, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request("invalid 'from' date format, expected YYYY-MM-DD"))?;
    let to = NaiveDate::parse_from_str(&query.to, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request("invalid 'to' date format, expected YYYY-MM-DD"))?;

    if to < from {
        return Err(AppError::bad_request("'to' must be on or after 'from'"));
    }

    let mut conn = state
        .db
        .get()
        .map_err(|e| AppError::internal(format!("db pool error: {e}")))?;

    let points: Vec<DailyMetric> = metrics_daily::table
        .filter(metrics_daily::metric_name.eq(&query.name))
        .filter(metrics_daily::metric_date.ge(from))
        .filter(metrics_daily::metric_date.le(to))
        .order(metrics_daily::metric_date.asc())
        .load(&mut conn)?;

    Ok(Json(ApiResponse::ok(MetricSeries {
        name: query.name,
        from,
        to,
        points,
    })))
}
