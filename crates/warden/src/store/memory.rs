use async_trait::async_trait;
use dashmap::DashMap;

use warden_common::Token;

use super::TokenBackend;
use crate::error::StoreError;

/// Process-local token backend. Entries are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Token>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn save(&self, key: &str, token: &Token) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), token.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
