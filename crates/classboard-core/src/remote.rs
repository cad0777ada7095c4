//! Backing-store REST client: session bootstrap, history read and the
//! lesson status side-channel.

use crate::op::{DrawOp, SlideIndex};
use crate::scene::Scene;
use crate::session::Session;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// Persisted whiteboard history for a session.
///
/// Serialized as a bare JSON array (ops) or object (scenes).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum History {
    /// Flat, persisted-order op list (incremental strategy).
    Ops(Vec<DrawOp>),
    /// Slide-index → scene mapping (full-snapshot strategy).
    Scenes(BTreeMap<SlideIndex, Scene>),
}

impl Default for History {
    fn default() -> Self {
        History::Ops(Vec::new())
    }
}

// Decoded through `Value` because buffered untagged decoding cannot parse
// the integer slide keys of the scene map.
impl<'de> Deserialize<'de> for History {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            value @ Value::Array(_) => serde_json::from_value(value)
                .map(History::Ops)
                .map_err(D::Error::custom),
            value @ Value::Object(_) => serde_json::from_value(value)
                .map(History::Scenes)
                .map_err(D::Error::custom),
            Value::Null => Ok(History::default()),
            other => Err(D::Error::custom(format!(
                "expected an op list or a scene map, got {}",
                other
            ))),
        }
    }
}

/// Request body for session bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub school_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
}

/// Response body for session bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_token: String,
}

/// Request body for the lesson status side-channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub school_id: String,
    pub status: String,
}

/// Backing-store errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Result type for backing-store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Out-of-band reads and writes against the backing store.
pub trait BackingStore: Send + Sync {
    /// Create a session for a school and return its token.
    fn create_session(&self, school_id: &str, auth_token: &str) -> RemoteResult<String>;

    /// Read the persisted history of a session.
    fn load_history(&self, session: &Session) -> RemoteResult<History>;

    /// Update a lesson/day completion status.
    fn update_status(&self, session: &Session, day: &str, status: &str) -> RemoteResult<()>;
}

/// Backing store reached over HTTP.
pub struct HttpBackingStore {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpBackingStore {
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check(response: reqwest::blocking::Response) -> RemoteResult<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl BackingStore for HttpBackingStore {
    fn create_session(&self, school_id: &str, auth_token: &str) -> RemoteResult<String> {
        let url = format!("{}/api/whiteboard/sessions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(auth_token)
            .json(&CreateSessionRequest {
                school_id: school_id.to_string(),
                topic_id: None,
            })
            .send()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let body: CreateSessionResponse = Self::check(response)?
            .json()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        log::info!("Created whiteboard session {}", body.session_token);
        Ok(body.session_token)
    }

    fn load_history(&self, session: &Session) -> RemoteResult<History> {
        let url = format!(
            "{}/api/whiteboard/sessions/{}/history",
            self.base_url, session.session_token
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&session.auth_token)
            .query(&[("school_id", session.school_id.as_str())])
            .send()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(session.session_token.clone()));
        }
        Self::check(response)?
            .json()
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    fn update_status(&self, session: &Session, day: &str, status: &str) -> RemoteResult<()> {
        let url = format!("{}/api/lessons/{}/status", self.base_url, day);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.auth_token)
            .json(&StatusUpdate {
                school_id: session.school_id.clone(),
                status: status.to_string(),
            })
            .send()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Self::check(response).map(|_| ())
    }
}

/// In-memory backing store for tests and offline use.
#[derive(Debug, Default)]
pub struct MemoryBackingStore {
    histories: RwLock<HashMap<String, History>>,
    statuses: RwLock<HashMap<String, String>>,
    next_id: RwLock<u64>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the persisted history of a session.
    pub fn insert_history(&self, session_token: &str, history: History) {
        if let Ok(mut histories) = self.histories.write() {
            histories.insert(session_token.to_string(), history);
        }
    }

    /// Append ops as if the server had persisted a flush.
    pub fn append_ops(&self, session_token: &str, ops: &[DrawOp]) {
        if let Ok(mut histories) = self.histories.write() {
            let entry = histories
                .entry(session_token.to_string())
                .or_insert_with(History::default);
            match entry {
                History::Ops(existing) => existing.extend_from_slice(ops),
                History::Scenes(_) => *entry = History::Ops(ops.to_vec()),
            }
        }
    }

    pub fn status(&self, day: &str) -> Option<String> {
        self.statuses.read().ok()?.get(day).cloned()
    }
}

impl BackingStore for MemoryBackingStore {
    fn create_session(&self, school_id: &str, _auth_token: &str) -> RemoteResult<String> {
        let mut next = self
            .next_id
            .write()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        *next += 1;
        let token = format!("{}{}", school_id, *next);
        self.insert_history(&token, History::default());
        Ok(token)
    }

    fn load_history(&self, session: &Session) -> RemoteResult<History> {
        let histories = self
            .histories
            .read()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        histories
            .get(&session.session_token)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(session.session_token.clone()))
    }

    fn update_status(&self, _session: &Session, day: &str, status: &str) -> RemoteResult<()> {
        let mut statuses = self
            .statuses
            .write()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        statuses.insert(day.to_string(), status.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::StrokeStyle;
    use kurbo::Point;

    fn session(token: &str) -> Session {
        Session {
            session_token: token.to_string(),
            school_id: "1".to_string(),
            auth_token: "secret".to_string(),
        }
    }

    #[test]
    fn test_history_untagged_decoding() {
        let ops: History = serde_json::from_str(
            r##"[{"x":1,"y":2,"tool":"eraser","color":"#ffffff","size":8,"slide":1,"timestamp":5,"isStart":true}]"##,
        )
        .unwrap();
        match ops {
            History::Ops(list) => assert_eq!(list[0].slide, 1),
            other => panic!("unexpected {other:?}"),
        }

        let scenes: History =
            serde_json::from_str(r#"{"0":{"elements":[],"appState":{},"files":{}}}"#).unwrap();
        assert!(matches!(scenes, History::Scenes(map) if map.contains_key(&0)));

        assert_eq!(serde_json::from_str::<History>("null").unwrap(), History::default());
        assert!(serde_json::from_str::<History>("42").is_err());
    }

    #[test]
    fn test_auth_token_not_serialized() {
        let json = serde_json::to_string(&session("s1")).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryBackingStore::new();
        let token = store.create_session("9", "auth").unwrap();
        let s = session(&token);
        assert_eq!(store.load_history(&s).unwrap(), History::Ops(Vec::new()));

        let op = DrawOp::new(Point::new(1.0, 1.0), StrokeStyle::default(), 0, 0, true);
        store.append_ops(&token, &[op, op]);
        match store.load_history(&s).unwrap() {
            History::Ops(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_memory_store_unknown_session() {
        let store = MemoryBackingStore::new();
        assert!(matches!(
            store.load_history(&session("missing")),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn test_status_side_channel() {
        let store = MemoryBackingStore::new();
        store.update_status(&session("s"), "3", "completed").unwrap();
        assert_eq!(store.status("3").as_deref(), Some("completed"));
    }
}
