use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use super::AppState;

const DEFAULT_LINES: usize = 200;
const MAX_LINES: usize = 10_000;

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema, utoipa::IntoParams))]
pub struct TailParams {
    pub lines: Option<usize>,
}

fn text_response(body: String) -> Response {
    let mut resp = Response::new(body.into());
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

fn not_available() -> Response {
    (StatusCode::NOT_FOUND, "Log file not available").into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/logs/tail", params(TailParams), responses((status = 200))))]
pub async fn logs_tail(
    State(state): State<AppState>,
    Query(params): Query<TailParams>,
) -> impl IntoResponse {
    let max_lines = params.lines.unwrap_or(DEFAULT_LINES).min(MAX_LINES);
    let Some(path) = resolve_log_file_path(&state.service.config().logging.file).await else {
        return not_available();
    };
    match fs::read_to_string(&path).await {
        Ok(contents) => text_response(last_lines(&contents, max_lines)),
        Err(_) => not_available(),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/logs/download", responses((status = 200))))]
pub async fn logs_download(State(state): State<AppState>) -> impl IntoResponse {
    let Some(path) = resolve_log_file_path(&state.service.config().logging.file).await else {
        return not_available();
    };
    match fs::read(&path).await {
        Ok(bytes) => {
            let mut resp = Response::new(bytes.into());
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/octet-stream"),
            );
            resp
        }
        Err(_) => not_available(),
    }
}

fn last_lines(contents: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Daily rotation writes `linkyd.YYYY-MM-DD.log`
fn name_matches(file_name: &str, prefix: &str, suffix: &str) -> bool {
    file_name == format!("{}.{}", prefix, suffix)
        || (file_name.starts_with(&format!("{}.", prefix))
            && file_name.ends_with(&format!(".{}", suffix)))
}

fn search_dir(configured: &Path) -> PathBuf {
    if configured.extension().is_some() {
        configured
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    } else {
        configured.to_path_buf()
    }
}

async fn find_latest_matching(dir: &Path, prefix: &str, suffix: &str) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    let mut rd = fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = rd.next_entry().await {
        if let Some(name) = entry.file_name().to_str()
            && name_matches(name, prefix, suffix)
            && let Ok(md) = entry.metadata().await
            && md.is_file()
            && let Ok(modified) = md.modified()
            && best.as_ref().is_none_or(|(t, _)| modified > *t)
        {
            best = Some((modified, entry.path()));
        }
    }
    best.map(|(_, p)| p)
}

/// Configured file if it exists, otherwise the newest rotated file next to it
async fn resolve_log_file_path(configured_path: &str) -> Option<PathBuf> {
    let configured = Path::new(configured_path);
    if let Ok(md) = fs::metadata(configured).await
        && md.is_file()
    {
        return Some(configured.to_path_buf());
    }
    find_latest_matching(&search_dir(configured), "linkyd", "log").await
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/logs/tail", get(logs_tail))
        .route("/api/logs/download", get(logs_download))
}
