//! In-process axum server and client helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use dualfetch_client::{
    BackendHandle, Client, EndpointRefresher, MemoryTokenStore, Notifier, RequestOptions, TokenPair,
};
use serde_json::{Value, json};

/// Both built-in backends; every behavioral test runs against each.
pub fn backends() -> [BackendHandle; 2] {
    [BackendHandle::rich(), BackendHandle::fetch()]
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dualfetch_client=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub struct ServerState {
    pub refreshes: AtomicUsize,
    pub protected_hits: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub authorizations: Mutex<Vec<String>>,
    pub refresh_tokens: Mutex<Vec<Option<String>>>,
}

impl ServerState {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn protected_hits(&self) -> usize {
        self.protected_hits.load(Ordering::SeqCst)
    }
}

pub struct TestServer {
    pub base: String,
    pub state: Arc<ServerState>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_state(ServerState::default()).await
    }

    pub async fn with_state(state: ServerState) -> Self {
        let state = Arc::new(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    /// A client whose base options point at this server's `/api` prefix.
    pub fn client(&self, backend: BackendHandle) -> Client {
        self.client_with(backend, Arc::new(MemoryTokenStore::new()), None)
    }

    /// A client that refreshes through this server's `/auth/refresh`.
    pub fn refreshing_client(
        &self,
        backend: BackendHandle,
        tokens: Arc<MemoryTokenStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Client {
        self.client_with(backend, tokens, notifier)
    }

    fn client_with(
        &self,
        backend: BackendHandle,
        tokens: Arc<MemoryTokenStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Client {
        let mut builder = Client::builder()
            .default_backend(backend)
            .base_options(
                RequestOptions::new()
                    .api_url(self.base.clone())
                    .url_prefix("/api")
                    .timeout(Duration::from_secs(5)),
            )
            .token_store(tokens)
            .refresher(EndpointRefresher::new(format!("{}/auth/refresh", self.base)));
        if let Some(notifier) = notifier {
            builder = builder.notifier(notifier);
        }
        builder.build().unwrap()
    }
}

pub fn stale_tokens() -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_tokens(
        TokenPair::new("stale").with_refresh_token("r1"),
    ))
}

/// Records every notification.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Notifier for Recorder {
    fn error_modal(&self, title: &str, message: &str) {
        self.push(format!("modal:{title}:{message}"));
    }

    fn error_message(&self, message: &str) {
        self.push(format!("error:{message}"));
    }

    fn success_message(&self, message: &str, blocking: bool) {
        self.push(format!("success:{message}:{blocking}"));
    }

    fn session_expired(&self, message: &str) {
        self.push(format!("expired:{message}"));
    }
}

// ============================================================================
// Routes
// ============================================================================

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/users/{id}", get(user))
        .route("/api/files/{name}", get(file))
        .route("/api/old", get(old))
        .route("/api/new", get(new))
        .route("/api/echo", any(echo))
        .route("/api/slow", get(slow))
        .route("/api/text", get(text))
        .route("/api/server-error", get(server_error))
        .route("/api/app-error", get(app_error))
        .route("/api/not-envelope", get(not_envelope))
        .route("/api/protected", get(protected))
        .route("/api/protected-status", get(protected_status))
        .route("/api/always-unauthorized", get(always_unauthorized))
        .route("/auth/refresh", post(refresh))
        .with_state(state)
}

fn ok(data: Value) -> Json<Value> {
    Json(json!({ "code": 200, "message": "ok", "data": data }))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

async fn user(Path(id): Path<u64>) -> Json<Value> {
    ok(json!({ "id": id, "name": format!("user-{id}") }))
}

async fn file(Path(name): Path<String>) -> Json<Value> {
    ok(json!(name))
}

async fn old() -> Redirect {
    Redirect::temporary("/api/new")
}

async fn new() -> Json<Value> {
    ok(json!("moved"))
}

async fn echo(
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Json<Value> {
    ok(json!({
        "method": method.as_str(),
        "query": query,
        "body": String::from_utf8_lossy(&body),
        "authorization": header(&headers, "authorization"),
        "contentType": header(&headers, "content-type"),
        "encrypted": header(&headers, "x-encrypted"),
        "encryptedKey": header(&headers, "x-encrypted-key"),
        "tenant": header(&headers, "x-tenant"),
    }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    ok(json!("slow"))
}

async fn text() -> &'static str {
    "plain hello"
}

async fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn app_error() -> Json<Value> {
    Json(json!({ "code": 5001, "message": "quota exceeded", "data": null }))
}

async fn not_envelope() -> Json<Value> {
    Json(json!({ "hello": "world" }))
}

fn is_fresh(state: &ServerState, headers: &HeaderMap) -> bool {
    state.protected_hits.fetch_add(1, Ordering::SeqCst);
    let authorization = header(headers, "authorization").unwrap_or_default();
    let fresh = authorization == "Bearer fresh";
    state.authorizations.lock().unwrap().push(authorization);
    fresh
}

/// Signals expiry through the envelope code with HTTP 200.
async fn protected(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Json<Value> {
    if is_fresh(&state, &headers) {
        ok(json!({ "secret": 42 }))
    } else {
        Json(json!({ "code": 401, "message": "token expired" }))
    }
}

/// Signals expiry through HTTP 401.
async fn protected_status(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if is_fresh(&state, &headers) {
        ok(json!({ "secret": 42 })).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn always_unauthorized(State(state): State<Arc<ServerState>>) -> StatusCode {
    state.protected_hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::UNAUTHORIZED
}

async fn refresh(State(state): State<Arc<ServerState>>, Json(body): Json<Value>) -> Response {
    state.refreshes.fetch_add(1, Ordering::SeqCst);
    state
        .refresh_tokens
        .lock()
        .unwrap()
        .push(body["refreshToken"].as_str().map(str::to_owned));
    tokio::time::sleep(Duration::from_millis(100)).await;

    if state.fail_refresh.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "refresh failed").into_response();
    }
    ok(json!({ "accessToken": "fresh", "refreshToken": "r2" })).into_response()
}
