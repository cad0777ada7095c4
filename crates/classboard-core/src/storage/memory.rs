//! In-memory storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::deck::SlideDeck;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    decks: RwLock<HashMap<String, SlideDeck>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn save(&self, id: &str, deck: &SlideDeck) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        let deck = deck.clone();
        Box::pin(async move {
            self.decks.write().map_err(lock_error)?.insert(id, deck);
            Ok(())
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<SlideDeck>> {
        let id = id.to_string();
        Box::pin(async move {
            let decks = self.decks.read().map_err(lock_error)?;
            decks.get(&id).cloned().ok_or(StorageError::NotFound(id))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.decks.write().map_err(lock_error)?.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let decks = self.decks.read().map_err(lock_error)?;
            Ok(decks.keys().cloned().collect())
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let decks = self.decks.read().map_err(lock_error)?;
            Ok(decks.contains_key(&id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_on;

    #[test]
    fn test_save_and_load() {
        let storage = MemoryStorage::new();
        let deck = SlideDeck::new();

        block_on(storage.save("test", &deck)).unwrap();
        let loaded = block_on(storage.load("test")).unwrap();

        assert_eq!(deck, loaded);
    }

    #[test]
    fn test_not_found() {
        let storage = MemoryStorage::new();
        let result = block_on(storage.load("nonexistent"));

        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let storage = MemoryStorage::new();
        block_on(storage.save("test", &SlideDeck::new())).unwrap();
        assert!(block_on(storage.exists("test")).unwrap());

        block_on(storage.delete("test")).unwrap();
        assert!(!block_on(storage.exists("test")).unwrap());
        block_on(storage.delete("test")).unwrap();
    }

    #[test]
    fn test_list() {
        let storage = MemoryStorage::new();
        block_on(storage.save("deck1", &SlideDeck::new())).unwrap();
        block_on(storage.save("deck2", &SlideDeck::new())).unwrap();

        let mut list = block_on(storage.list()).unwrap();
        list.sort();
        assert_eq!(list, vec!["deck1".to_string(), "deck2".to_string()]);
    }
}
