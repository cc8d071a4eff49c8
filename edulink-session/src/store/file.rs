//! JSON file key-value store
//!
//! All keys live in one JSON object on disk. Every mutation rewrites the file
//! through a temporary sibling and a rename, so a crash mid-write leaves the
//! previous contents in place.

use async_trait::async_trait;
use edulink_core::{EdulinkError, EdulinkResult, ErrorContext, KeyValueStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

type Entries = BTreeMap<String, String>;

/// Persistent store backed by a single JSON file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Open a store at `path`, creating the parent directory if needed
    ///
    /// The file itself is created on the first write; until then the store
    /// reads as empty.
    pub fn new<P: AsRef<Path>>(path: P) -> EdulinkResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                storage_failure(
                    format!("Failed to create store directory {}: {}", parent.display(), e),
                    None,
                    "open",
                    e,
                )
            })?;
        }

        info!("File store initialized at: {}", path.display());

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self, key: &str) -> EdulinkResult<Entries> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => {
                return Err(storage_failure(
                    format!("Failed to read {}: {}", self.path.display(), e),
                    Some(key),
                    "read",
                    e,
                ));
            }
        };

        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            storage_failure(
                format!("Corrupt store file {}: {}", self.path.display(), e),
                Some(key),
                "parse",
                e,
            )
        })
    }

    async fn write_entries(&self, key: &str, entries: &Entries) -> EdulinkResult<()> {
        let json_data = serde_json::to_string_pretty(entries).map_err(|e| {
            storage_failure(
                format!("Failed to serialize store: {}", e),
                Some(key),
                "serialize",
                e,
            )
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json_data).await.map_err(|e| {
            storage_failure(
                format!("Failed to write {}: {}", tmp_path.display(), e),
                Some(key),
                "write",
                e,
            )
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            storage_failure(
                format!("Failed to replace {}: {}", self.path.display(), e),
                Some(key),
                "rename",
                e,
            )
        })?;

        debug!(key = key, path = %self.path.display(), "Store file updated");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> EdulinkResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_entries(key).await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> EdulinkResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries(key).await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(key, &entries).await
    }

    async fn remove(&self, key: &str) -> EdulinkResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries(key).await?;
        if entries.remove(key).is_some() {
            self.write_entries(key, &entries).await?;
        }
        Ok(())
    }
}

fn storage_failure<E>(message: String, key: Option<&str>, operation: &str, source: E) -> EdulinkError
where
    E: std::error::Error + Send + Sync + 'static,
{
    EdulinkError::Storage {
        message,
        key: key.map(str::to_string),
        source: Some(Box::new(source)),
        context: ErrorContext::new("file_store")
            .with_operation(operation)
            .with_suggestion("Check that the data directory exists and is writable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path).unwrap();
        assert_eq!(store.get("userToken").await.unwrap(), None);

        store.set("userToken", "tok123").await.unwrap();
        store.set("userRole", "teacher").await.unwrap();
        drop(store);

        let reopened = FileStore::new(&path).unwrap();
        assert_eq!(
            reopened.get("userToken").await.unwrap().as_deref(),
            Some("tok123")
        );
        assert_eq!(
            reopened.get("userRole").await.unwrap().as_deref(),
            Some("teacher")
        );

        reopened.remove("userToken").await.unwrap();
        reopened.remove("missing").await.unwrap();
        assert_eq!(reopened.get("userToken").await.unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::new(&path).unwrap();
        let error = store.get("userToken").await.unwrap_err();
        assert!(error.is_storage());

        let error = store.set("userToken", "tok").await.unwrap_err();
        assert!(matches!(error, EdulinkError::Storage { key: Some(ref k), .. } if k == "userToken"));
    }

    #[tokio::test]
    async fn test_empty_file_reads_as_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "").unwrap();

        let store = FileStore::new(&path).unwrap();
        assert_eq!(store.get("userId").await.unwrap(), None);
    }
}
