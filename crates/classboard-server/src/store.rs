//! Session storage: pending op buffers, chunked persistence, scene maps and
//! lesson status.

use crate::config::ServerConfig;
use classboard_core::{DrawOp, History, Scene, SlideIndex};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted run of ops. Indices start at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub ops: Vec<DrawOp>,
    #[serde(skip)]
    bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionRecord {
    token: String,
    school_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic_id: Option<String>,
    #[serde(default)]
    chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scenes: Option<BTreeMap<SlideIndex, Scene>>,
    #[serde(skip)]
    pending: Vec<DrawOp>,
}

impl SessionRecord {
    fn new(token: &str, school_id: &str, topic_id: Option<String>) -> Self {
        Self {
            token: token.to_string(),
            school_id: school_id.to_string(),
            topic_id,
            ..Self::default()
        }
    }

    /// Move pending ops into the latest chunk, opening a new one when the
    /// combined size would exceed `max_bytes`.
    fn drain_pending(&mut self, max_bytes: usize) -> StoreResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let ops = std::mem::take(&mut self.pending);
        let count = ops.len();
        let bytes = serialized_len(&ops)?;

        match self.chunks.last_mut() {
            Some(latest) if latest.bytes + bytes <= max_bytes => {
                latest.ops.extend(ops);
                latest.bytes = serialized_len(&latest.ops)?;
            }
            latest => {
                let index = latest.map(|c| c.index + 1).unwrap_or(1);
                self.chunks.push(Chunk { index, ops, bytes });
            }
        }
        Ok(count)
    }

    fn history(&self) -> History {
        match &self.scenes {
            Some(scenes) => History::Scenes(scenes.clone()),
            None => History::Ops(
                self.chunks
                    .iter()
                    .flat_map(|chunk| chunk.ops.iter().copied())
                    .collect(),
            ),
        }
    }
}

fn serialized_len<T: Serialize>(value: &T) -> StoreResult<usize> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Shared store behind every route.
pub struct WhiteboardStore {
    sessions: DashMap<String, SessionRecord>,
    /// (school_id, day) -> status
    statuses: DashMap<(String, String), String>,
    data_dir: Option<PathBuf>,
    flush_threshold: usize,
    max_chunk_bytes: usize,
}

impl WhiteboardStore {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            statuses: DashMap::new(),
            data_dir: config.data_dir.clone(),
            flush_threshold: config.flush_threshold,
            max_chunk_bytes: config.max_chunk_bytes,
        }
    }

    /// Create the store and load any sessions saved in the data dir.
    pub fn open(config: &ServerConfig) -> StoreResult<Self> {
        let store = Self::new(config);
        let Some(dir) = &store.data_dir else {
            return Ok(store);
        };
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;
        let entries = std::fs::read_dir(dir)
            .map_err(|e| StoreError::Io(format!("Failed to read {}: {}", dir.display(), e)))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_record(&path) {
                Ok(record) => {
                    store.sessions.insert(record.token.clone(), record);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        info!("Loaded {} session(s) from {}", store.sessions.len(), dir.display());
        Ok(store)
    }

    pub fn create_session(&self, school_id: &str, topic_id: Option<String>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions
            .insert(token.clone(), SessionRecord::new(&token, school_id, topic_id));
        info!("Created session {} for school {}", token, school_id);
        token
    }

    /// Register a session first seen on the sync endpoint.
    /// Register `token` for `school_id` unless it already exists.
    /// Returns the tenant that owns the session.
    pub fn ensure_session(&self, token: &str, school_id: &str) -> String {
        self.sessions
            .entry(token.to_string())
            .or_insert_with(|| SessionRecord::new(token, school_id, None))
            .school_id
            .clone()
    }

    pub fn school_of(&self, token: &str) -> Option<String> {
        self.sessions.get(token).map(|r| r.school_id.clone())
    }

    /// Buffer ops; drains into chunks once the threshold is reached.
    /// Returns the number of ops persisted by this call.
    pub fn append_ops(&self, token: &str, ops: Vec<DrawOp>) -> StoreResult<usize> {
        let mut record = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| StoreError::UnknownSession(token.to_string()))?;
        record.pending.extend(ops);
        if record.pending.len() < self.flush_threshold {
            return Ok(0);
        }
        let flushed = record.drain_pending(self.max_chunk_bytes)?;
        debug!("Flushed {} op(s) for session {}", flushed, token);
        self.persist(token, &record)?;
        Ok(flushed)
    }

    /// Drain pending ops regardless of the threshold (socket closed).
    pub fn flush(&self, token: &str) -> StoreResult<usize> {
        let mut record = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| StoreError::UnknownSession(token.to_string()))?;
        let flushed = record.drain_pending(self.max_chunk_bytes)?;
        if flushed > 0 {
            debug!("Flushed {} op(s) for session {}", flushed, token);
            self.persist(token, &record)?;
        }
        Ok(flushed)
    }

    /// Replace the session's scene map. The newest snapshot wins.
    pub fn replace_scenes(
        &self,
        token: &str,
        scenes: BTreeMap<SlideIndex, Scene>,
    ) -> StoreResult<()> {
        let mut record = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| StoreError::UnknownSession(token.to_string()))?;
        debug!("Stored {} scene(s) for session {}", scenes.len(), token);
        record.scenes = Some(scenes);
        self.persist(token, &record)
    }

    /// Persisted history: the scene map if one was stored, else the chunked ops.
    pub fn history(&self, token: &str) -> StoreResult<History> {
        self.sessions
            .get(token)
            .map(|record| record.history())
            .ok_or_else(|| StoreError::UnknownSession(token.to_string()))
    }

    pub fn chunks(&self, token: &str) -> Vec<Chunk> {
        self.sessions
            .get(token)
            .map(|r| r.chunks.clone())
            .unwrap_or_default()
    }

    pub fn pending_len(&self, token: &str) -> usize {
        self.sessions.get(token).map(|r| r.pending.len()).unwrap_or(0)
    }

    pub fn set_status(&self, school_id: &str, day: &str, status: &str) {
        self.statuses
            .insert((school_id.to_string(), day.to_string()), status.to_string());
    }

    pub fn status(&self, school_id: &str, day: &str) -> Option<String> {
        self.statuses
            .get(&(school_id.to_string(), day.to_string()))
            .map(|s| s.clone())
    }

    fn persist(&self, token: &str, record: &SessionRecord) -> StoreResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}.json", sanitize_token(token)));
        let json = serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(&path, json)
            .map_err(|e| StoreError::Io(format!("Failed to write {}: {}", path.display(), e)))
    }
}

fn load_record(path: &Path) -> StoreResult<SessionRecord> {
    let json = std::fs::read(path).map_err(|e| StoreError::Io(e.to_string()))?;
    let mut record: SessionRecord =
        serde_json::from_slice(&json).map_err(|e| StoreError::Serialization(e.to_string()))?;
    for chunk in &mut record.chunks {
        chunk.bytes = serialized_len(&chunk.ops)?;
    }
    Ok(record)
}

fn sanitize_token(token: &str) -> String {
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
