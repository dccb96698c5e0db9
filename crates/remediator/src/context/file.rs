//! File-backed context store.
//!
//! Layout: `<root>/<session-id>/<key>.json`. An entry is written to a
//! uniquely named temporary file and then hard-linked into place. Linking
//! fails if the target exists, so write-once holds across processes and a
//! reader never sees a half-written entry.

use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ContextEntry, ContextKey, ContextStore};
use crate::error::StoreError;

/// Durable context store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileContextStore {
    root: PathBuf,
}

impl FileContextStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !session_id.is_empty()
            && session_id.len() <= 128
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidSessionId(session_id.to_string()));
        }
        Ok(self.root.join(session_id))
    }

    fn entry_path(dir: &Path, key: ContextKey) -> PathBuf {
        dir.join(format!("{key}.json"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl ContextStore for FileContextStore {
    async fn put(&self, session_id: &str, entry: ContextEntry) -> Result<(), StoreError> {
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let path = Self::entry_path(&dir, entry.key);
        if fs::try_exists(&path).await.map_err(|e| io_error(&path, e))? {
            return Err(StoreError::AlreadyWritten {
                session_id: session_id.to_string(),
                key: entry.key,
            });
        }

        let body = serde_json::to_vec_pretty(&entry)?;
        let tmp = dir.join(format!(".{}.{}.tmp", entry.key, uuid::Uuid::new_v4().simple()));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        file.write_all(&body).await.map_err(|e| io_error(&tmp, e))?;
        file.sync_all().await.map_err(|e| io_error(&tmp, e))?;
        drop(file);

        let linked = fs::hard_link(&tmp, &path).await;
        // Best effort; readers never look at temp files.
        let _ = fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => Err(StoreError::AlreadyWritten {
                session_id: session_id.to_string(),
                key: entry.key,
            }),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn get(&self, session_id: &str, key: ContextKey) -> Result<ContextEntry, StoreError> {
        let dir = self.session_dir(session_id)?;
        let path = Self::entry_path(&dir, key);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    session_id: session_id.to_string(),
                    key,
                })
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        Ok(serde_json::from_slice(&body)?)
    }

    async fn keys(&self, session_id: &str) -> Result<Vec<ContextKey>, StoreError> {
        let dir = self.session_dir(session_id)?;
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(item) = read_dir.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let name = item.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(key) = stem.parse::<ContextKey>() {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut ids = Vec::new();
        while let Some(item) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let is_dir = item
                .file_type()
                .await
                .map_err(|e| io_error(&item.path(), e))?
                .is_dir();
            if let (true, Some(name)) = (is_dir, item.file_name().to_str()) {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(key: ContextKey, value: serde_json::Value) -> ContextEntry {
        ContextEntry::new(key, value, key.producer())
    }

    #[tokio::test]
    async fn test_write_once_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContextStore::new(dir.path());

        store
            .put("s1", entry(ContextKey::Incident, json!({"alert": "A"})))
            .await
            .unwrap();
        let err = store
            .put("s1", entry(ContextKey::Incident, json!({"alert": "B"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyWritten { .. }));

        let stored = store.get("s1", ContextKey::Incident).await.unwrap();
        assert_eq!(stored.value["alert"], "A");
        assert!(dir.path().join("s1").join("incident.json").exists());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileContextStore::new(dir.path())
            .put("s1", entry(ContextKey::Report, json!({"content": "done"})))
            .await
            .unwrap();

        let reopened = FileContextStore::new(dir.path());
        assert_eq!(reopened.keys("s1").await.unwrap(), vec![ContextKey::Report]);
        assert_eq!(reopened.sessions().await.unwrap(), vec!["s1"]);
        let err = reopened
            .put("s1", entry(ContextKey::Report, json!({"content": "again"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyWritten { .. }));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContextStore::new(dir.path());
        let err = store
            .put("../escape", entry(ContextKey::Incident, json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSessionId(_)));
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContextStore::new(dir.path().join("not-yet-created"));
        assert!(store.sessions().await.unwrap().is_empty());
        assert!(store.keys("s1").await.unwrap().is_empty());
        assert!(matches!(
            store.get("s1", ContextKey::Failure).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
