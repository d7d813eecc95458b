use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::{
    domain::{FoodId, FoodSummary},
    error::{ApiError, ErrorCode},
    protocol::{CreateFoodRequest, FOOD_ROUTE},
};
use storage::Storage;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use api::ApiContext;
use app_state::AppState;
use config::{load_settings, prepare_database_url};

const API_PREFIX: &str = "/api";
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext {
            storage: storage.clone(),
        },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.close().await;
    info!("database connection closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            &format!("{API_PREFIX}{FOOD_ROUTE}"),
            get(http_list_foods).post(http_create_food),
        )
        .route(
            &format!("{API_PREFIX}{FOOD_ROUTE}/:food_id"),
            get(http_get_food),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err.message, "api: request failed");
    }
    (status, Json(err))
}

async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    state.api.storage.health_check().await.map_err(|e| {
        warn!(error = %e, "healthz: storage unavailable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, "storage unavailable")),
        )
    })?;
    Ok("ok")
}

async fn http_list_foods(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FoodSummary>>, (StatusCode, Json<ApiError>)> {
    api::list_foods(&state.api).await.map(Json).map_err(reject)
}

async fn http_get_food(
    State(state): State<Arc<AppState>>,
    Path(food_id): Path<i64>,
) -> Result<Json<FoodSummary>, (StatusCode, Json<ApiError>)> {
    api::get_food(&state.api, FoodId(food_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_food(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFoodRequest>,
) -> Result<(StatusCode, Json<FoodSummary>), (StatusCode, Json<ApiError>)> {
    let food = api::create_food(&state.api, req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(food)))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
