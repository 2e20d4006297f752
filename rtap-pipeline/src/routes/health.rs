use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::prelude::*;
use metrics_exporter_prometheus::PrometheusHandle;
use rtap_shared::{HealthCheck, HealthResponse, HealthStatus};
use std::sync::Arc;

use crate::AppState;

/// Health check that probes the metrics database.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let db_check = match state.db.get() {
        Ok(mut conn) => match diesel::sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => HealthCheck {
                name: "database".to_string(),
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => HealthCheck {
                name: "database".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(format!("{e}")),
            },
        },
        Err(e) => HealthCheck {
            name: "database".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(format!("{e}")),
        },
    };

    let response = HealthResponse::healthy("rtap-pipeline", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![db_check]);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns the Prometheus exposition text for the scraper.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
