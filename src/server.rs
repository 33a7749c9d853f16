//!
//! cabinet HTTP server
//! -------------------
//! This module defines the Axum-based HTTP API for cabinet.
//!
//! Responsibilities:
//! - User registration and Basic-auth login issuing X-Token sessions.
//! - Token resolution per request through the session gate; every file
//!   operation runs with the resolved owner id.
//! - File endpoints delegating to the file service: create, point get,
//!   paginated listing, publish/unpublish, raw content with variant support.
//! - Startup inventory logs and store construction on the content root.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::files::{FileService, FileView};
use crate::identity::SessionManager;
use crate::security::UserStore;
use crate::storage::{BlobStore, FileId, FileStore, ParentFilter, UserId};

const TOKEN_HEADER: &str = "x-token";

/// Shared server state injected into all handlers.
///
/// Holds the injected store handles: user records, the session gate and the
/// file service. All are cheap clones over shared state.
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub sessions: SessionManager,
    pub files: FileService,
}

fn log_startup_folders(content_root: &str) {
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let root_env = std::env::var("FOLDER_PATH").ok();
    info!(
        target: "startup",
        "cabinet starting. Folder configuration: cwd={:?}, exe={:?}, content_root_param={:?}, FOLDER_PATH_env={:?}",
        cwd, exe, content_root, root_env
    );
    let root_exists = std::path::Path::new(content_root).exists();
    info!(target: "startup", "Path existence: content_root_exists={}", root_exists);
}

/// Start the cabinet HTTP server bound to the given port, with all stores
/// rooted under `content_root` (created recursively if absent).
pub async fn run_with_ports(http_port: u16, content_root: &str) -> anyhow::Result<()> {
    // Print folder configuration as the very first thing on startup
    log_startup_folders(content_root);

    std::fs::create_dir_all(content_root)
        .with_context(|| format!("Failed to create or access content root: {}", content_root))?;
    let users = UserStore::open(content_root)
        .with_context(|| format!("While opening user store under: {}", content_root))?;
    let files = FileStore::open(content_root)
        .with_context(|| format!("While opening file store under: {}", content_root))?;
    let blobs = BlobStore::new(content_root)
        .with_context(|| format!("While opening blob store under: {}", content_root))?;

    info!("Store inventory: {} users, {} files", users.count(), files.count());

    let app_state = AppState {
        users,
        sessions: SessionManager::default(),
        files: FileService::new(files, blobs),
    };

    let app = Router::new()
        .route("/", get(|| async { "cabinet ok" }))
        .route("/stats", get(stats))
        .route("/users", post(create_user))
        .route("/users/me", get(me))
        .route("/connect", get(connect))
        .route("/disconnect", get(disconnect))
        .route("/files", post(create_file).get(list_files))
        .route("/files/{id}", get(get_file))
        .route("/files/{id}/publish", put(publish_file))
        .route("/files/{id}/unpublish", put(unpublish_file))
        .route("/files/{id}/data", get(file_data))
        .with_state(app_state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience entry point reading `CABINET_HTTP_PORT` (default 5000) and
/// `FOLDER_PATH` (default /tmp/files_manager).
pub async fn run() -> anyhow::Result<()> {
    let http_port = std::env::var("CABINET_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(5000);
    let content_root = std::env::var("FOLDER_PATH").unwrap_or_else(|_| "/tmp/files_manager".to_string());
    run_with_ports(http_port, &content_root).await
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn resolve_user(state: &AppState, headers: &HeaderMap) -> Option<UserId> {
    let token = token_from_headers(headers)?;
    state.sessions.resolve(&token)
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = auth.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (email, password) = text.split_once(':')?;
    if email.is_empty() || password.is_empty() {
        return None;
    }
    Some((email.to_string(), password.to_string()))
}

fn error_response(err: AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"status": "error", "code": err.code_str(), "message": err.message()})))
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({"status": "error", "code": "unauthorized", "message": "Unauthorized"})))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"users": state.users.count(), "files": state.files.store().count()})))
}

#[derive(Debug, Deserialize, Default)]
struct RegisterPayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

async fn create_user(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> impl IntoResponse {
    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();
    match state.users.create(&email, &password) {
        Ok(user) => (StatusCode::CREATED, Json(json!({"id": user.id, "email": user.email}))),
        Err(e) => error_response(e),
    }
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(user_id) = resolve_user(&state, &headers) else {
        return unauthorized();
    };
    match state.users.get(user_id) {
        Some(user) => (StatusCode::OK, Json(json!({"id": user.id, "email": user.email}))),
        None => unauthorized(),
    }
}

async fn connect(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some((email, password)) = basic_credentials(&headers) else {
        return unauthorized();
    };
    let Some(user) = state.users.authenticate(&email, &password) else {
        return unauthorized();
    };
    let session = state.sessions.issue(user.id);
    info!(target: "cabinet::auth", "connect: user={}", user.id);
    (StatusCode::OK, Json(json!({"token": session.token})))
}

async fn disconnect(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(token) = token_from_headers(&headers) else {
        return unauthorized().into_response();
    };
    if state.sessions.resolve(&token).is_none() {
        return unauthorized().into_response();
    }
    state.sessions.revoke(&token);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
struct CreateFilePayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    /// Wire value 0 denotes the root sentinel.
    #[serde(default, rename = "parentId")]
    parent_id: Option<FileId>,
    #[serde(default, rename = "isPublic")]
    is_public: bool,
    #[serde(default)]
    data: Option<String>,
}

async fn create_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateFilePayload>,
) -> impl IntoResponse {
    let Some(owner_id) = resolve_user(&state, &headers) else {
        return unauthorized();
    };
    let parent_id = payload.parent_id.filter(|&p| p != 0);
    match state.files.create(
        owner_id,
        payload.name.as_deref(),
        payload.kind.as_deref(),
        parent_id,
        payload.is_public,
        payload.data.as_deref(),
    ) {
        Ok(rec) => (StatusCode::CREATED, Json(json!(FileView::from(&rec)))),
        Err(e) => error_response(e),
    }
}

async fn get_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FileId>,
) -> impl IntoResponse {
    let Some(owner_id) = resolve_user(&state, &headers) else {
        return unauthorized();
    };
    match state.files.get(owner_id, id) {
        Ok(rec) => (StatusCode::OK, Json(json!(FileView::from(&rec)))),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default, rename = "parentId")]
    parent_id: Option<FileId>,
    #[serde(default)]
    page: Option<usize>,
}

async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let Some(owner_id) = resolve_user(&state, &headers) else {
        return unauthorized();
    };
    let parent = match query.parent_id {
        None => ParentFilter::Any,
        Some(0) => ParentFilter::Root,
        Some(p) => ParentFilter::In(p),
    };
    let items = state.files.list(owner_id, parent, query.page.unwrap_or(0));
    (StatusCode::OK, Json(json!(items)))
}

fn set_file_visibility(
    state: &AppState,
    headers: &HeaderMap,
    id: FileId,
    is_public: bool,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(owner_id) = resolve_user(state, headers) else {
        return unauthorized();
    };
    match state.files.set_visibility(owner_id, id, is_public) {
        Ok(rec) => (StatusCode::OK, Json(json!(FileView::from(&rec)))),
        Err(e) => error_response(e),
    }
}

async fn publish_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FileId>,
) -> impl IntoResponse {
    set_file_visibility(&state, &headers, id, true)
}

async fn unpublish_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FileId>,
) -> impl IntoResponse {
    set_file_visibility(&state, &headers, id, false)
}

#[derive(Debug, Deserialize)]
struct DataQuery {
    #[serde(default)]
    size: Option<String>,
}

async fn file_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<FileId>,
    Query(query): Query<DataQuery>,
) -> axum::response::Response {
    // Unauthenticated calls are valid here; visibility decides access.
    let requester = resolve_user(&state, &headers);
    let variant = query.size.as_deref().filter(|s| !s.is_empty());
    match state.files.get_content(requester, id, variant) {
        Ok((bytes, content_type)) => {
            let mut out = HeaderMap::new();
            let value = HeaderValue::from_str(&content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            out.insert(header::CONTENT_TYPE, value);
            (StatusCode::OK, out, bytes).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}
