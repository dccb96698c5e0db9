//! In-memory context store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ContextEntry, ContextKey, ContextStore};
use crate::error::StoreError;

/// Context store kept in process memory. Lost on restart.
#[derive(Clone, Default)]
pub struct MemoryContextStore {
    entries: Arc<RwLock<HashMap<String, BTreeMap<ContextKey, ContextEntry>>>>,
}

impl MemoryContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn put(&self, session_id: &str, entry: ContextEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let session = entries.entry(session_id.to_string()).or_default();
        if session.contains_key(&entry.key) {
            return Err(StoreError::AlreadyWritten {
                session_id: session_id.to_string(),
                key: entry.key,
            });
        }
        session.insert(entry.key, entry);
        Ok(())
    }

    async fn get(&self, session_id: &str, key: ContextKey) -> Result<ContextEntry, StoreError> {
        let entries = self.entries.read().await;
        entries
            .get(session_id)
            .and_then(|session| session.get(&key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                session_id: session_id.to_string(),
                key,
            })
    }

    async fn keys(&self, session_id: &str) -> Result<Vec<ContextKey>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(session_id)
            .map(|session| session.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn sessions(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
