//! Local persistence of slide decks.
//!
//! Decks are stored per session so navigation and a later export can recover
//! slides that were never synced.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::deck::SlideDeck;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Deck not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for storage operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Trait for deck storage backends.
pub trait Storage: Send + Sync {
    /// Save a deck under `id`, replacing any previous one.
    fn save(&self, id: &str, deck: &SlideDeck) -> BoxFuture<'_, StorageResult<()>>;

    /// Load a deck.
    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<SlideDeck>>;

    /// Delete a deck. Deleting a missing deck succeeds.
    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all stored deck IDs.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    /// Check if a deck exists.
    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>>;
}

#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    pollster::block_on(f)
}
