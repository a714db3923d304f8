//! Shared test utilities: an in-process mock of the asset-management
//! service, plus helpers for minting signed tokens and client configs.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::json;

use client::prelude::*;

/// Mint a JWT-shaped token with the given claims payload.
pub fn mint_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.fakesig", header, payload)
}

/// One multipart upload the mock service observed.
#[derive(Debug, Clone)]
pub struct SeenUpload {
    pub category_id: String,
    pub file_name: String,
    pub byte_len: usize,
}

#[derive(Default)]
pub struct MockState {
    /// Claims encoded into tokens minted by `/token`.
    pub claims: Mutex<serde_json::Value>,
    pub token_requests: AtomicUsize,

    /// Full category listing the service paginates over.
    pub categories: Mutex<Vec<serde_json::Value>>,
    pub category_requests: AtomicUsize,
    /// Fail the nth category page request (1-based) with a 500.
    pub fail_category_request: Mutex<Option<usize>>,
    /// Reject the nth category page request (1-based) with a 401.
    pub unauthorized_category_request: Mutex<Option<usize>>,
    /// Headers seen on the most recent category request.
    pub last_category_headers: Mutex<Option<HeaderMap>>,
    /// `workspaceId` seen on the most recent category request.
    pub last_workspace: Mutex<Option<String>>,

    /// Uploads received on `POST /assets`.
    pub uploads: Mutex<Vec<SeenUpload>>,

    /// Scripted `GET /assets/{id}` responses, consumed in order; the last
    /// one repeats.
    pub asset_responses: Mutex<HashMap<String, Vec<serde_json::Value>>>,

    /// `GET /permissions` body.
    pub permissions: Mutex<serde_json::Value>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        *state.claims.lock() = json!({ "aud": "env-test", "workspaces": ["ws-1"] });
        *state.permissions.lock() = json!({});
        Arc::new(state)
    }

    pub fn set_categories(&self, categories: Vec<serde_json::Value>) {
        *self.categories.lock() = categories;
    }
}

/// Generate `count` categories, every one accepting the given extensions.
pub fn category_fixture(count: usize, extensions: &[&str]) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": format!("cat-{}", i),
                "name": format!("Category {}", i),
                "allowedExtensions": extensions,
            })
        })
        .collect()
}

async fn token_handler(State(state): State<Arc<MockState>>) -> String {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    // Hold the lock only long enough to clone the claims.
    let claims = state.claims.lock().clone();
    mint_token(claims)
}

async fn categories_handler(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let request_no = state.category_requests.fetch_add(1, Ordering::SeqCst) + 1;
    *state.last_category_headers.lock() = Some(headers);
    *state.last_workspace.lock() = params.get("workspaceId").cloned();

    if let Some(fail_at) = *state.fail_category_request.lock() {
        if request_no == fail_at {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "page exploded" })),
            );
        }
    }

    if let Some(reject_at) = *state.unauthorized_category_request.lock() {
        if request_no == reject_at {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "token expired" })),
            );
        }
    }

    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);
    let offset: usize = params
        .get("offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let all = state.categories.lock();
    let items: Vec<_> = all.iter().skip(offset).take(limit).cloned().collect();
    (
        StatusCode::OK,
        Json(json!({
            "items": items,
            "offset": offset,
            "limit": limit,
            "totalCount": all.len(),
        })),
    )
}

async fn upload_handler(
    State(state): State<Arc<MockState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut category_id = String::new();
    let mut file_name = String::new();
    let mut byte_len = 0;

    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name().unwrap_or("") {
            "categoryId" => category_id = field.text().await.unwrap(),
            "file" => {
                file_name = field.file_name().unwrap_or("unnamed").to_string();
                byte_len = field.bytes().await.unwrap().len();
            }
            _ => {}
        }
    }

    state.uploads.lock().push(SeenUpload {
        category_id,
        file_name,
        byte_len,
    });

    Json(json!({
        "id": "asset-new",
        "imageUrls": {
            "120": "https://cdn.test/new-120.webp",
            "400": "https://cdn.test/new-400.webp",
            "default": "https://cdn.test/new.png",
        },
        "metadata": { "width": 400, "height": 300 },
    }))
}

async fn asset_handler(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let mut responses = state.asset_responses.lock();
    match responses.get_mut(&id) {
        Some(scripted) if !scripted.is_empty() => {
            let body = if scripted.len() == 1 {
                scripted[0].clone()
            } else {
                scripted.remove(0)
            };
            (StatusCode::OK, Json(body))
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({ "message": "no such asset" }))),
    }
}

async fn permissions_handler(State(state): State<Arc<MockState>>) -> Json<serde_json::Value> {
    Json(state.permissions.lock().clone())
}

async fn file_handler(Path(name): Path<String>) -> impl IntoResponse {
    let content_type = mime_guess::from_path(&name)
        .first_or_octet_stream()
        .to_string();
    ([(CONTENT_TYPE, content_type)], vec![0u8; 4])
}

/// Bind the mock service to an ephemeral port and serve it in the
/// background for the rest of the test.
pub async fn spawn_service(state: Arc<MockState>) -> SocketAddr {
    let app = Router::new()
        .route("/token", get(token_handler))
        .route("/categories", get(categories_handler))
        .route("/assets", post(upload_handler))
        .route("/assets/:id", get(asset_handler))
        .route("/permissions", get(permissions_handler))
        .route("/files/:name", get(file_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Config pointed at the mock service.
pub fn config_for(addr: SocketAddr) -> ServiceConfig {
    ServiceConfig::new(
        &format!("http://{}/", addr),
        &format!("http://{}/token", addr),
    )
    .unwrap()
}

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spin up a mock service and a connected client with default claims.
pub async fn setup() -> (Arc<MockState>, Arc<AssetClient>) {
    init_tracing();
    let state = MockState::new();
    let addr = spawn_service(state.clone()).await;
    let client = AssetClient::connect(config_for(addr)).await.unwrap();
    (state, Arc::new(client))
}
