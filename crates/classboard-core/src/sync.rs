//! WebSocket transport for the whiteboard sync channel.
//!
//! Provides the wire messages, a `Transport` abstraction and the native
//! client used to stream ops or scene snapshots to the backing store.

use crate::op::{DrawOp, SlideIndex};
use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One buffer flush of ops (incremental strategy).
    Draw(Vec<DrawOp>),
    /// The whole deck as slide-index → scene (full-snapshot strategy).
    Scene(BTreeMap<SlideIndex, Scene>),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

/// Payload of the server greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    pub session_id: String,
    pub message: String,
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the connection is accepted.
    WhiteboardUpdate(Greeting),
    /// Server-side failure report.
    Error(String),
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Socket established
    Connected,
    /// Socket closed by either side
    Disconnected,
    /// Server accepted the session
    Greeting(Greeting),
    /// Error occurred
    Error { message: String },
}

/// Callback invoked when the channel closes.
pub type CloseHandler = Box<dyn FnMut() + Send>;

/// Duplex channel to the backing store.
///
/// Sending is fire-and-forget: no acknowledgement, no retry, no reconnect.
/// Implementations wanting retry/backoff can add it behind this trait.
pub trait Transport {
    /// Start connecting to `url`.
    fn open(&mut self, url: &str) -> Result<(), SyncError>;

    /// Queue a message for sending.
    fn send(&mut self, message: &ClientMessage) -> Result<(), SyncError>;

    /// Close the channel. Closing a closed channel does nothing.
    fn close(&mut self);

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<SyncEvent>;

    /// Register a callback run once the channel closes.
    fn on_close(&mut self, handler: CloseHandler);

    fn state(&self) -> ConnectionState;

    /// Whether a send would currently be attempted.
    fn is_open(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, url: &str) -> Result<(), SyncError> {
        (**self).open(url)
    }

    fn send(&mut self, message: &ClientMessage) -> Result<(), SyncError> {
        (**self).send(message)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        (**self).poll_events()
    }

    fn on_close(&mut self, handler: CloseHandler) {
        (**self).on_close(handler)
    }

    fn state(&self) -> ConnectionState {
        (**self).state()
    }
}

/// Build the sync channel URL for a session.
///
/// `{base}/ws/whiteboard/{session_token}/?token={auth_token}&school_id={school_id}`
pub fn channel_url(
    base: &str,
    session_token: &str,
    auth_token: &str,
    school_id: &str,
) -> Result<Url, SyncError> {
    let mut url = Url::parse(base).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(SyncError::InvalidUrl(format!(
            "Invalid WebSocket URL scheme: {}",
            url.scheme()
        )));
    }
    url.path_segments_mut()
        .map_err(|_| SyncError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(["ws", "whiteboard", session_token, ""]);
    url.query_pairs_mut()
        .clear()
        .append_pair("token", auth_token)
        .append_pair("school_id", school_id);
    Ok(url)
}

/// At most `max` characters of `text`, cut on a char boundary.
fn log_preview(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(i, _)| &text[..i])
}

fn parse_server_message(text: &str) -> Option<SyncEvent> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::WhiteboardUpdate(greeting)) => Some(SyncEvent::Greeting(greeting)),
        Ok(ServerMessage::Error(message)) => Some(SyncEvent::Error { message }),
        Err(_) => {
            log::debug!("Ignoring server message: {}", log_preview(text, 100));
            None
        }
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread so sends never block the input path.
    pub struct NativeWebSocket {
        state: ConnectionState,
        events: Vec<SyncEvent>,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<SyncEvent>>,
        /// Handle to the WebSocket thread.
        _thread: Option<JoinHandle<()>>,
        on_close: Option<CloseHandler>,
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
                on_close: None,
            }
        }

        fn notify_closed(&mut self) {
            if let Some(handler) = self.on_close.as_mut() {
                handler();
            }
        }
    }

    fn run_socket(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<SyncEvent>) {
        log::info!("WebSocket thread: connecting to {}", url);

        let (mut socket, response) = match connect(&url) {
            Ok(connected) => connected,
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = event_tx.send(SyncEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        log::info!("WebSocket connected, status: {}", response.status());
        let _ = event_tx.send(SyncEvent::Connected);

        // Short read timeout so queued sends are not starved by a blocking read.
        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    log::debug!("WebSocket sending: {}", super::log_preview(&msg, 100));
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    // Let the close handshake go out before dropping the socket.
                    let _ = socket.flush();
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("WebSocket command channel disconnected");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    if let Some(event) = parse_server_message(&txt) {
                        let _ = event_tx.send(event);
                    }
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(frame)) => {
                    log::info!("WebSocket received close frame: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(SyncEvent::Disconnected);
    }

    impl Transport for NativeWebSocket {
        fn open(&mut self, url: &str) -> Result<(), SyncError> {
            if self.cmd_tx.is_some() {
                return Err(SyncError::AlreadyConnected);
            }

            let parsed_url = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(SyncError::InvalidUrl(format!(
                    "Invalid WebSocket URL scheme: {}",
                    parsed_url.scheme()
                )));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let url = url.to_string();
            let handle = thread::spawn(move || run_socket(url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        fn send(&mut self, message: &ClientMessage) -> Result<(), SyncError> {
            let tx = self.cmd_tx.as_ref().ok_or(SyncError::NotConnected)?;
            tx.send(WsCommand::Send(message.to_json()?))
                .map_err(|e| SyncError::Send(e.to_string()))
        }

        fn close(&mut self) {
            let Some(tx) = self.cmd_tx.take() else {
                return;
            };
            let _ = tx.send(WsCommand::Close);
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
            self.notify_closed();
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            let mut closed = false;
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected => {
                            self.state = ConnectionState::Disconnected;
                            closed = true;
                        }
                        SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                        SyncEvent::Greeting(_) => {}
                    }
                    self.events.push(event);
                }
            }
            if closed || self.state == ConnectionState::Error {
                // The socket thread is gone; drop the command side so a later
                // send reports NotConnected instead of queueing into the void.
                self.cmd_tx = None;
                self.event_rx = None;
                self._thread = None;
                if closed {
                    self.notify_closed();
                }
            }
            std::mem::take(&mut self.events)
        }

        fn on_close(&mut self, handler: CloseHandler) {
            self.on_close = Some(handler);
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.close();
        }
    }
}

pub use native_client::NativeWebSocket;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::StrokeStyle;
    use kurbo::Point;

    #[test]
    fn test_log_preview_respects_char_boundaries() {
        let text = format!("{}é{}", "a".repeat(99), "b".repeat(10));
        assert_eq!(log_preview(&text, 100), format!("{}é", "a".repeat(99)));
        assert_eq!(log_preview("short", 100), "short");
        assert!(parse_server_message(&"ü".repeat(80)).is_none());
    }

    #[test]
    fn test_draw_message_shape() {
        let op = DrawOp::new(Point::new(1.0, 2.0), StrokeStyle::default(), 0, 1, true);
        let json = ClientMessage::Draw(vec![op]).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "draw");
        assert_eq!(value["data"][0]["x"], 1.0);
    }

    #[test]
    fn test_scene_message_keys_are_indices() {
        let mut map = BTreeMap::new();
        map.insert(0, Scene::new());
        map.insert(3, Scene::new());
        let json = ClientMessage::Scene(map.clone()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "scene");
        assert!(value["data"].get("3").is_some());

        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClientMessage::Scene(map));
    }

    #[test]
    fn test_server_greeting() {
        let json = r#"{"type":"whiteboard_update","data":{"session_id":"abc","message":"Connected to whiteboard"}}"#;
        match parse_server_message(json) {
            Some(SyncEvent::Greeting(g)) => assert_eq!(g.session_id, "abc"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_server_message(r#"{"type":"peer_joined"}"#).is_none());
    }

    #[test]
    fn test_channel_url() {
        let url = channel_url("ws://localhost:8000", "sess42", "tok en", "7").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/ws/whiteboard/sess42/?token=tok+en&school_id=7"
        );
        let url = channel_url("wss://host/base/", "s", "t", "1").unwrap();
        assert_eq!(url.path(), "/base/ws/whiteboard/s/");
    }

    #[test]
    fn test_channel_url_rejects_http() {
        assert!(matches!(
            channel_url("http://localhost", "s", "t", "1"),
            Err(SyncError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_native_send_without_open() {
        let mut ws = NativeWebSocket::new();
        assert!(!ws.is_open());
        let result = ws.send(&ClientMessage::Draw(Vec::new()));
        assert!(matches!(result, Err(SyncError::NotConnected)));
        // Closing a never-opened socket is a no-op.
        ws.close();
        assert_eq!(ws.state(), ConnectionState::Disconnected);
    }
}
