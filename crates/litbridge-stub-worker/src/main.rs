//! Minimal stand-in for the JS SDK worker.
//!
//! Answers `/isReady` and `/litNodeClient/getProperty`; every other endpoint
//! echoes its request body back under `echo`. Listens on `127.0.0.1:$PORT`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json, Router,
    extract::{OriginalUri, State},
    routing::post,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use litbridge::bridge::protocol;
use litbridge::supervisor::DEFAULT_PORT;

/// `RUST_LOG` wins; otherwise `LITBRIDGE_LOG` sets one level for this binary
/// and the library. `LOG_FORMAT=json` switches stderr output to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LITBRIDGE_LOG").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(format!("litbridge={level},litbridge_stub_worker={level}"))
    });
    let json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init();
}

#[derive(Default)]
struct StubState {
    connected: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct PropertyQuery {
    #[serde(default)]
    property: String,
}

fn routes(state: Arc<StubState>) -> Router {
    Router::new()
        .route(protocol::IS_READY, post(is_ready))
        .route(protocol::NODE_CLIENT_GET_PROPERTY, post(get_property))
        .route(protocol::NODE_CLIENT_CONNECT, post(connect))
        .route(protocol::NODE_CLIENT_DISCONNECT, post(disconnect))
        .fallback(echo)
        .with_state(state)
}

async fn is_ready() -> Json<Value> {
    Json(json!({ "ready": true }))
}

async fn get_property(
    State(state): State<Arc<StubState>>,
    Json(query): Json<PropertyQuery>,
) -> Json<Value> {
    let property = match query.property.as_str() {
        "ready" => json!(true),
        "connected" => json!(state.connected.load(Ordering::SeqCst)),
        _ => Value::Null,
    };
    Json(json!({ "property": property }))
}

async fn connect(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.connected.store(true, Ordering::SeqCst);
    Json(json!({ "success": true }))
}

async fn disconnect(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.connected.store(false, Ordering::SeqCst);
    Json(json!({ "success": true }))
}

// Body is raw bytes so an empty POST still echoes.
async fn echo(OriginalUri(uri): OriginalUri, body: axum::body::Bytes) -> Json<Value> {
    let payload = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)))
    };
    info!(endpoint = %uri.path(), "Unhandled endpoint, echoing");
    Json(json!({ "endpoint": uri.path(), "echo": payload }))
}

fn port_from_env() -> anyhow::Result<u16> {
    match std::env::var("PORT") {
        Ok(raw) if !raw.is_empty() => Ok(raw.parse()?),
        _ => Ok(DEFAULT_PORT),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let port = port_from_env()?;
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    // The supervisor captures stdout; this line is what a crash dump shows first.
    println!("stub worker listening on {actual_addr}");
    info!(port, version = litbridge::LITBRIDGE_VERSION, "Stub worker started");

    axum::serve(listener, routes(Arc::default()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Stub worker shutdown complete");
    Ok(())
}
