//! HTTP routes and the whiteboard sync socket.

use crate::config::ServerConfig;
use crate::store::{StoreError, WhiteboardStore};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use classboard_core::remote::{CreateSessionRequest, CreateSessionResponse, StatusUpdate};
use classboard_core::sync::{ClientMessage, Greeting, ServerMessage};
use classboard_core::History;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Close code for a missing or rejected auth token.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;
/// Close code for an unknown tenant.
pub const CLOSE_UNKNOWN_SCHOOL: u16 = 4002;

pub struct AppState {
    pub config: ServerConfig,
    pub store: WhiteboardStore,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or invalid auth token")]
    Unauthorized,
    #[error("Unknown school: {0}")]
    UnknownSchool(String),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownSession(token) => ApiError::NotFound(token),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UnknownSchool(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/whiteboard/sessions", post(create_session))
        .route(
            "/api/whiteboard/sessions/{session_token}/history",
            get(session_history),
        )
        .route("/api/lessons/{day}/status", post(lesson_status))
        .route("/ws/whiteboard/{session_id}/", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> &'static str {
    "Classboard backing store - sync via WebSocket at /ws/whiteboard/{session_id}/"
}

async fn health() -> &'static str {
    "ok"
}

fn authorize(config: &ServerConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if config.accepts_token(token) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn check_school(config: &ServerConfig, school_id: &str) -> Result<(), ApiError> {
    if config.accepts_school(school_id) {
        Ok(())
    } else {
        Err(ApiError::UnknownSchool(school_id.to_string()))
    }
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    authorize(&state.config, &headers)?;
    check_school(&state.config, &request.school_id)?;
    let session_token = state
        .store
        .create_session(&request.school_id, request.topic_id);
    Ok(Json(CreateSessionResponse { session_token }))
}

#[derive(Debug, Default, Deserialize)]
struct SchoolQuery {
    #[serde(default)]
    school_id: String,
}

async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(session_token): Path<String>,
    Query(query): Query<SchoolQuery>,
    headers: HeaderMap,
) -> Result<Json<History>, ApiError> {
    authorize(&state.config, &headers)?;
    check_school(&state.config, &query.school_id)?;
    // Sessions are only visible to their own tenant.
    if state.store.school_of(&session_token).as_deref() != Some(query.school_id.as_str()) {
        return Err(ApiError::NotFound(session_token));
    }
    Ok(Json(state.store.history(&session_token)?))
}

async fn lesson_status(
    State(state): State<Arc<AppState>>,
    Path(day): Path<String>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> Result<StatusCode, ApiError> {
    authorize(&state.config, &headers)?;
    check_school(&state.config, &update.school_id)?;
    state.store.set_status(&update.school_id, &day, &update.status);
    info!("School {} day {} marked {}", update.school_id, day, update.status);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct SocketQuery {
    #[serde(default)]
    token: String,
    #[serde(default)]
    school_id: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<SocketQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, query))
}

fn text(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            None
        }
    }
}

async fn reject(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: String,
    query: SocketQuery,
) {
    if !state.config.accepts_token(&query.token) {
        warn!("Rejected session {}: bad token", session_id);
        return reject(socket, CLOSE_UNAUTHORIZED, "unauthorized").await;
    }
    if !state.config.accepts_school(&query.school_id) {
        warn!("Rejected session {}: unknown school {}", session_id, query.school_id);
        return reject(socket, CLOSE_UNKNOWN_SCHOOL, "unknown school").await;
    }

    let owner = state.store.ensure_session(&session_id, &query.school_id);
    if owner != query.school_id {
        warn!(
            "Rejected session {}: owned by school {}, not {}",
            session_id, owner, query.school_id
        );
        return reject(socket, CLOSE_UNKNOWN_SCHOOL, "unknown school").await;
    }
    info!("Whiteboard connected: {}", session_id);

    let (mut sender, mut receiver) = socket.split();
    let greeting = ServerMessage::WhiteboardUpdate(Greeting {
        session_id: session_id.clone(),
        message: "Connected to whiteboard".to_string(),
    });
    if let Some(message) = text(&greeting) {
        if sender.send(message).await.is_err() {
            return;
        }
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(body)) => {
                let result = match serde_json::from_str::<ClientMessage>(body.as_str()) {
                    Ok(ClientMessage::Draw(ops)) => {
                        state.store.append_ops(&session_id, ops).map(|_| ())
                    }
                    Ok(ClientMessage::Scene(scenes)) => {
                        state.store.replace_scenes(&session_id, scenes)
                    }
                    Err(e) => {
                        warn!("Invalid message on {}: {}", session_id, e);
                        let reply = ServerMessage::Error(format!("Invalid message: {}", e));
                        if let Some(reply) = text(&reply) {
                            let _ = sender.send(reply).await;
                        }
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    warn!("Failed to store update for {}: {}", session_id, e);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // Ignore binary and ping/pong
            Err(e) => {
                warn!("WebSocket error for {}: {}", session_id, e);
                break;
            }
        }
    }

    match state.store.flush(&session_id) {
        Ok(flushed) => info!("Whiteboard closed: {} ({} op(s) flushed)", session_id, flushed),
        Err(e) => warn!("Flush on close failed for {}: {}", session_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classboard_core::{DrawOp, RgbColor, Tool};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn state(config: ServerConfig) -> Arc<AppState> {
        Arc::new(AppState {
            store: WhiteboardStore::new(&config),
            config,
        })
    }

    async fn serve(state: Arc<AppState>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        addr
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        headers
    }

    fn ops(n: usize) -> Vec<DrawOp> {
        (0..n)
            .map(|i| DrawOp {
                x: i as f64,
                y: 1.0,
                tool: Tool::Pen,
                color: RgbColor::RED,
                size: 3.0,
                slide: 0,
                timestamp: i as u64,
                is_start: i == 0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_session_and_read_history() {
        let state = state(ServerConfig::default());
        let Json(created) = create_session(
            State(state.clone()),
            bearer("t"),
            Json(CreateSessionRequest {
                school_id: "3".to_string(),
                topic_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(!created.session_token.is_empty());

        let Json(history) = session_history(
            State(state.clone()),
            Path(created.session_token.clone()),
            Query(SchoolQuery {
                school_id: "3".to_string(),
            }),
            bearer("t"),
        )
        .await
        .unwrap();
        assert_eq!(history, History::Ops(Vec::new()));

        // Another tenant cannot see it.
        let other = session_history(
            State(state),
            Path(created.session_token),
            Query(SchoolQuery {
                school_id: "4".to_string(),
            }),
            bearer("t"),
        )
        .await;
        assert!(matches!(other, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rest_requires_token_and_school() {
        let config = ServerConfig {
            schools: ["3".to_string()].into_iter().collect(),
            ..ServerConfig::default()
        };
        let state = state(config);
        let request = || {
            Json(CreateSessionRequest {
                school_id: "9".to_string(),
                topic_id: None,
            })
        };

        let result = create_session(State(state.clone()), HeaderMap::new(), request()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));

        let result = create_session(State(state), bearer("t"), request()).await;
        assert!(matches!(result, Err(ApiError::UnknownSchool(_))));
        assert_eq!(
            ApiError::UnknownSchool("9".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_lesson_status() {
        let state = state(ServerConfig::default());
        let status = lesson_status(
            State(state.clone()),
            Path("12".to_string()),
            bearer("t"),
            Json(StatusUpdate {
                school_id: "3".to_string(),
                status: "completed".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.store.status("3", "12").as_deref(), Some("completed"));
    }

    #[tokio::test]
    async fn test_socket_greets_and_flushes_on_close() {
        let state = state(ServerConfig::default());
        let addr = serve(state.clone()).await;
        let url = format!("ws://{}/ws/whiteboard/s1/?token=t0k&school_id=3", addr);
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let greeting = ws.next().await.unwrap().unwrap();
        let greeting: ServerMessage = serde_json::from_str(greeting.to_text().unwrap()).unwrap();
        match greeting {
            ServerMessage::WhiteboardUpdate(g) => assert_eq!(g.session_id, "s1"),
            other => panic!("unexpected greeting {other:?}"),
        }

        let draw = serde_json::to_string(&ClientMessage::Draw(ops(3))).unwrap();
        ws.send(WsMessage::text(draw)).await.unwrap();
        ws.close(None).await.unwrap();

        // Below the threshold the ops only persist once the socket closes.
        let mut persisted = Vec::new();
        for _ in 0..100 {
            if let Ok(History::Ops(found)) = state.store.history("s1") {
                if !found.is_empty() {
                    persisted = found;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(persisted, ops(3));
        assert_eq!(state.store.chunks("s1")[0].index, 1);
    }

    #[tokio::test]
    async fn test_socket_rejections() {
        let config = ServerConfig {
            schools: ["3".to_string()].into_iter().collect(),
            ..ServerConfig::default()
        };
        let addr = serve(state(config)).await;

        for (query, expected) in [
            ("token=&school_id=3", CLOSE_UNAUTHORIZED),
            ("token=t0k&school_id=9", CLOSE_UNKNOWN_SCHOOL),
        ] {
            let url = format!("ws://{}/ws/whiteboard/s1/?{}", addr, query);
            let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), expected),
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_socket_rejects_other_tenants_session() {
        let state = state(ServerConfig::default());
        let token = state.store.create_session("3", None);
        let addr = serve(state.clone()).await;

        let url = format!("ws://{}/ws/whiteboard/{}/?token=t0k&school_id=4", addr, token);
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        match ws.next().await.unwrap().unwrap() {
            WsMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), CLOSE_UNKNOWN_SCHOOL)
            }
            other => panic!("expected close frame, got {other:?}"),
        }
        assert_eq!(state.store.school_of(&token).as_deref(), Some("3"));
        assert_eq!(state.store.history(&token).unwrap(), History::Ops(Vec::new()));
    }
}
