use axum::middleware;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod models;
mod routes;
mod schema;
mod services;

use config::AppConfig;
use rtap_shared::clients::db::{create_pool, DbPool};

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rtap_shared::middleware::init_tracing("rtap-pipeline");

    let config = AppConfig::load()?;
    let port = config.port;
    let metrics_port = config.metrics_port;

    let metrics_handle = rtap_shared::middleware::init_metrics();

    let db = create_pool(&config.database_url());

    let state = Arc::new(AppState { db, config });

    // Exposition endpoint for the scraper. Bound before the ETL loop starts
    // and served independently of the tick cycle; a bind failure here aborts
    // startup.
    let exposition = Router::new()
        .route("/metrics", get(routes::health::metrics))
        .with_state(metrics_handle);
    let metrics_addr = format!("0.0.0.0:{metrics_port}");
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr).await?;
    tracing::info!(addr = %metrics_addr, "metrics exposition listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, exposition).await {
            tracing::error!(error = %e, "metrics exposition server failed");
        }
    });

    // Periodic recomputation of today's and yesterday's daily metrics.
    services::etl::spawn_etl_task(state.clone());

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics/daily", get(routes::metrics_daily::get_daily_metrics))
        .route("/events/recent", get(routes::events::get_recent_events))
        .layer(middleware::from_fn(
            rtap_shared::middleware::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "rtap-pipeline starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
