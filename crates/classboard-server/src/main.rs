//! Classboard backing store
//!
//! Creates whiteboard sessions, accepts the sync socket and persists what
//! is drawn during a lesson.
//!
//! ## Protocol
//!
//! The socket lives at `/ws/whiteboard/{session_id}/?token=..&school_id=..`.
//! Messages are JSON:
//! ```json
//! { "type": "draw", "data": [ { "x": 1.0, "y": 2.0, "tool": "pen", ... } ] }
//! { "type": "scene", "data": { "0": { "elements": [], "files": {} } } }
//! ```
//! The server greets with `{ "type": "whiteboard_update", "data": { "session_id", "message" } }`
//! and closes with 4001 (bad token) or 4002 (unknown school).

mod config;
mod routes;
mod store;

use config::ServerConfig;
use routes::AppState;
use std::sync::Arc;
use store::WhiteboardStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classboard_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let store = WhiteboardStore::open(&config)?;
    let addr = config.addr;
    let state = Arc::new(AppState { config, store });

    info!("Classboard backing store listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws/whiteboard/{{session_id}}/", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
