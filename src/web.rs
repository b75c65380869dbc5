//! Axum-based HTTP server exposing entity states, with optional OpenAPI (utoipa) and Swagger UI

mod logs;

use crate::error::LinkydError;
use crate::service::Service;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({"ok": false, "error": message})),
    )
        .into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Scheduler, store and outage monitor status")
)))]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.health())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/sensors", responses(
    (status = 200, description = "Every exposed entity")
)))]
async fn sensors(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.entities())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/linky_card", responses(
    (status = 200, description = "Linky card entity with its attributes")
)))]
async fn linky_card(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.linky_card())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/outage", responses(
    (status = 200, description = "Grid status entity"),
    (status = 404, description = "Outage monitoring disabled")
)))]
async fn outage(State(state): State<AppState>) -> Response {
    if !state.service.config().outage.enabled {
        return error_response(StatusCode::NOT_FOUND, "outage monitoring disabled".into());
    }
    Json(state.service.outage_entity()).into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/refresh", responses(
    (status = 200, description = "Readings refreshed"),
    (status = 409, description = "A refresh is already running"),
    (status = 502, description = "EDF API request failed")
)))]
async fn refresh(State(state): State<AppState>) -> Response {
    match state.service.force_refresh().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response(),
        Err(e @ LinkydError::Busy) => error_response(StatusCode::CONFLICT, e.to_string()),
        Err(e @ (LinkydError::Upstream { .. } | LinkydError::Transport { .. })) => {
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config", responses((status = 200))))]
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let mut cfg = state.service.config().clone();
    if !cfg.api.access_token.is_empty() {
        cfg.api.access_token = "***".to_string();
    }
    let json = serde_json::to_value(cfg).unwrap_or(serde_json::json!({"error":"serialization"}));
    Json(json)
}

#[cfg(feature = "openapi")]
#[utoipa::path(get, path = "/api/config/schema", responses((status = 200)))]
async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(serde_json::json!({"error":"schema"})))
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, sensors, linky_card, outage, refresh,
        get_config, get_config_schema,
        logs::logs_tail, logs::logs_download,
    ),
    components(schemas(logs::TailParams)),
    tags((name = "linkyd", description = "EDF consumption and grid status API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/sensors", get(sensors))
        .route("/api/linky_card", get(linky_card))
        .route("/api/outage", get(outage))
        .route("/api/refresh", post(refresh))
        .route("/api/config", get(get_config))
        .merge(logs::routes());

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router
            .route("/api/config/schema", get(get_config_schema))
            .merge(
                utoipa_swagger_ui::SwaggerUi::new("/docs")
                    .url("/openapi.json", ApiDoc::openapi()),
            )
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until the service's poll loops are asked to stop
pub async fn serve(service: Arc<Service>, host: &str, port: u16) -> anyhow::Result<()> {
    let mut shutdown = service.subscribe_shutdown();
    let router = build_router(AppState { service });

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api, docs /docs)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}
