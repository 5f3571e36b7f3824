//! Example: building the facade from a JSON document
//!
//! Parses a `FacadeConfig`, builds a client from it and shows how per-call
//! options layer over the base configuration.
//!
//! Run with: cargo run --bin config-demo
//! Pass a config file: cargo run --bin config-demo -- ./dualfetch.json

use std::env;
use std::net::SocketAddr;

use axum::extract::RawQuery;
use axum::routing::any;
use axum::{Json, Router};
use dualfetch_client::{
    ClientBuilder, ErrorMessageMode, FacadeConfig, RequestDescriptor, RequestOptions,
};
use serde_json::{Value, json};

const DEFAULT_CONFIG: &str = r#"{
    "defaultBackend": "fetch",
    "baseConfig": {
        "urlPrefix": "/api",
        "timeout": 3000,
        "joinTime": false,
        "headers": { "x-client": "config-demo" }
    }
}"#;

async fn echo(RawQuery(query): RawQuery) -> Json<Value> {
    Json(json!({ "code": 200, "message": "ok", "data": { "query": query } }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let document = match env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_CONFIG.to_string(),
    };
    let config = FacadeConfig::from_json(&document)?;

    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let base = format!("http://{}", listener.local_addr()?);
    let app = Router::new().route("/api/echo", any(echo));
    tokio::spawn(async move { axum::serve(listener, app).await });

    // The document leaves apiUrl out; fill it in for the local server
    let mut config = config;
    config.base_config.api_url = Some(base);

    println!("=== Example: Facade From Config ===");
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();

    let client = ClientBuilder::from_config(config).build()?;
    println!("Default backend: {}", client.default_backend());

    let echoed: Value = client
        .get(
            RequestDescriptor::new("/echo").param("q", "  padded  "),
            RequestOptions::new().error_message_mode(ErrorMessageMode::None),
        )
        .await?;
    println!("Trimmed query: {}", echoed["query"]);

    Ok(())
}
