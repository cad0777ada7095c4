//! Server configuration from `CLASSBOARD_*` environment variables.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Pending ops per session before they are drained into chunks.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

/// Largest serialized chunk before a new one is opened.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
#[error("Invalid value for {key}: {value}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// One JSON file per session is kept here when set.
    pub data_dir: Option<PathBuf>,
    /// Accepted tenant ids. Empty accepts any tenant.
    pub schools: HashSet<String>,
    /// Accepted auth tokens. Empty accepts any non-empty token.
    pub auth_tokens: HashSet<String>,
    pub flush_threshold: usize,
    pub max_chunk_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            data_dir: None,
            schools: HashSet::new(),
            auth_tokens: HashSet::new(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = lookup("CLASSBOARD_ADDR") {
            config.addr = addr.parse().map_err(|_| ConfigError {
                key: "CLASSBOARD_ADDR",
                value: addr,
            })?;
        }
        config.data_dir = lookup("CLASSBOARD_DATA_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        if let Some(schools) = lookup("CLASSBOARD_SCHOOLS") {
            config.schools = split_list(&schools);
        }
        if let Some(tokens) = lookup("CLASSBOARD_AUTH_TOKENS") {
            config.auth_tokens = split_list(&tokens);
        }
        Ok(config)
    }

    pub fn accepts_school(&self, school_id: &str) -> bool {
        !school_id.is_empty() && (self.schools.is_empty() || self.schools.contains(school_id))
    }

    pub fn accepts_token(&self, token: &str) -> bool {
        !token.is_empty() && (self.auth_tokens.is_empty() || self.auth_tokens.contains(token))
    }
}

fn split_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
