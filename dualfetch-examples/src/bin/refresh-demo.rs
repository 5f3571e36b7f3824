//! Example: concurrent token expiry on both backends
//!
//! Starts a small API server whose `/api/profile` route only accepts the token
//! `fresh`, then fires several concurrent calls with a stale token through each
//! backend. Only one refresh runs per backend; every call is replayed with the
//! new token.
//!
//! Run with: cargo run --bin refresh-demo
//! Verbose: RUST_LOG=dualfetch_client=debug cargo run --bin refresh-demo

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use dualfetch_client::{
    BackendHandle, Client, EndpointRefresher, MemoryTokenStore, RequestDescriptor, RequestOptions,
    TokenPair, TokenStore,
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

#[derive(Default)]
struct Counters {
    refreshes: AtomicUsize,
}

async fn profile(headers: HeaderMap) -> Json<Value> {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if authorization == "Bearer fresh" {
        Json(json!({ "code": 200, "message": "ok", "data": { "name": "Alice" } }))
    } else {
        Json(json!({ "code": 401, "message": "token expired" }))
    }
}

async fn refresh(State(counters): State<Arc<Counters>>) -> Json<Value> {
    counters.refreshes.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    Json(json!({
        "code": 200,
        "message": "",
        "data": { "accessToken": "fresh", "refreshToken": "next" }
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dualfetch_client=info".into()),
        )
        .init();

    let counters = Arc::new(Counters::default());
    let app = Router::new()
        .route("/api/profile", get(profile))
        .route("/api/auth/refresh", post(refresh))
        .with_state(counters.clone());

    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let base = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move { axum::serve(listener, app).await });

    println!("=== Example: Concurrent Token Refresh ===");
    println!("Server listening on {base}");
    println!();

    for backend in [BackendHandle::rich(), BackendHandle::fetch()] {
        let tokens = Arc::new(MemoryTokenStore::with_tokens(
            TokenPair::new("stale").with_refresh_token("seed"),
        ));
        let client = Client::builder()
            .default_backend(backend.clone())
            .base_options(RequestOptions::new().api_url(base.clone()).url_prefix("/api"))
            .token_store(tokens.clone())
            .refresher(EndpointRefresher::new(format!("{base}/api/auth/refresh")))
            .build()?;

        let before = counters.refreshes.load(Ordering::SeqCst);
        let calls = (0..5).map(|_| {
            let client = client.clone();
            async move {
                client
                    .get::<Profile>(RequestDescriptor::new("/profile"), RequestOptions::new())
                    .await
            }
        });
        let profiles = futures::future::try_join_all(calls).await?;

        println!("Backend {backend}:");
        println!("  {} calls answered for {:?}", profiles.len(), profiles[0].name);
        println!(
            "  refreshes: {}",
            counters.refreshes.load(Ordering::SeqCst) - before
        );
        println!("  stored token: {:?}", tokens.access_token());
        println!();
    }

    Ok(())
}
