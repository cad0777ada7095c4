//! Session identity shared by the sync channel and the backing store.

use crate::sync::{SyncError, channel_url};
use serde::{Deserialize, Serialize};

/// Identifies the remote document a whiteboard reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_token: String,
    pub school_id: String,
    #[serde(default, skip_serializing)]
    pub auth_token: String,
}

impl Session {
    pub fn new(
        session_token: impl Into<String>,
        school_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            session_token: session_token.into(),
            school_id: school_id.into(),
            auth_token: auth_token.into(),
        }
    }

    /// WebSocket URL of this session's channel under `ws_base`.
    pub fn channel_url(&self, ws_base: &str) -> Result<String, SyncError> {
        channel_url(ws_base, &self.session_token, &self.auth_token, &self.school_id)
            .map(|url| url.to_string())
    }

    /// Key used for local persistence of this session's deck.
    pub fn storage_key(&self) -> String {
        format!("{}-{}", self.school_id, self.session_token)
    }
}
