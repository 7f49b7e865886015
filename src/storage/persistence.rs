//! Snapshot-file persistence for document buckets.

use super::memory::{Checkpoint, InMemoryDocumentStore};
use super::{DocumentQuery, DocumentRows, DocumentStore, Revision, StoredDocument};
use crate::core::{PersistError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

// ============================================================================
// Bucket Snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub format_version: u16,
    pub bucket: String,
    pub primary_index: bool,
    pub last_cas: u64,
    pub documents: Vec<SnapshotDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: String,
    pub cas: u64,
    pub content: JsonValue,
}

// ============================================================================
// Snapshot File
// ============================================================================

pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<BucketSnapshot>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(PersistError::StorageUnavailable(format!(
                    "Failed to read snapshot '{}': {}",
                    self.path.display(),
                    err
                )));
            }
        };
        let snapshot = rmp_serde::from_slice(&bytes).map_err(|err| {
            PersistError::StorageUnavailable(format!(
                "Failed to deserialize snapshot '{}': {}",
                self.path.display(),
                err
            ))
        })?;
        Ok(Some(snapshot))
    }

    /// Writes the snapshot next to its target and renames it into place.
    pub async fn save(&self, snapshot: &BucketSnapshot) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(snapshot).map_err(|err| {
            PersistError::StorageUnavailable(format!("Failed to serialize snapshot: {}", err))
        })?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|err| {
                PersistError::StorageUnavailable(format!(
                    "Failed to create parent directory '{}': {}",
                    parent.display(),
                    err
                ))
            })?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).await.map_err(|err| {
            PersistError::StorageUnavailable(format!(
                "Failed to write temp file '{}': {}",
                tmp.display(),
                err
            ))
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|err| {
            PersistError::StorageUnavailable(format!(
                "Failed to rename temp file '{}' -> '{}': {}",
                tmp.display(),
                self.path.display(),
                err
            ))
        })?;
        Ok(())
    }
}

// ============================================================================
// File Document Store
// ============================================================================

/// In-memory bucket that rewrites its snapshot file after every mutation.
pub struct FileDocumentStore {
    inner: InMemoryDocumentStore,
    file: SnapshotFile,
    write_lock: Mutex<()>,
}

impl FileDocumentStore {
    pub async fn open<P: AsRef<Path>>(path: P, bucket: &str) -> Result<Self> {
        let file = SnapshotFile::new(path);
        let inner = match file.load().await? {
            Some(snapshot) => {
                if snapshot.bucket != bucket {
                    return Err(PersistError::Validation(format!(
                        "snapshot '{}' holds bucket '{}', expected '{}'",
                        file.path().display(),
                        snapshot.bucket,
                        bucket
                    )));
                }
                debug!(path = %file.path().display(), documents = snapshot.documents.len(), "snapshot loaded");
                InMemoryDocumentStore::from_snapshot(snapshot)?
            }
            None => InMemoryDocumentStore::new(bucket),
        };

        Ok(Self {
            inner,
            file,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Writes the current bucket to disk, undoing the in-memory mutation
    /// since `checkpoint` when the file cannot be written.
    async fn flush_or_rollback(&self, checkpoint: Checkpoint) -> Result<()> {
        let snapshot = self.inner.export_snapshot().await;
        if let Err(err) = self.file.save(&snapshot).await {
            warn!(path = %self.file.path().display(), error = %err, "snapshot flush failed, rolling back");
            self.inner.rollback(checkpoint).await;
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn get(&self, id: &str) -> Result<StoredDocument> {
        self.inner.get(id).await
    }

    async fn create(&self, id: &str, content: JsonValue) -> Result<Revision> {
        let _guard = self.write_lock.lock().await;
        let checkpoint = self.inner.checkpoint().await;
        let revision = self.inner.create(id, content).await?;
        self.flush_or_rollback(checkpoint).await?;
        Ok(revision)
    }

    async fn update(&self, revision: &Revision, content: JsonValue) -> Result<Revision> {
        let _guard = self.write_lock.lock().await;
        let checkpoint = self.inner.checkpoint().await;
        let revision = self.inner.update(revision, content).await?;
        self.flush_or_rollback(checkpoint).await?;
        Ok(revision)
    }

    async fn query(&self, query: &DocumentQuery) -> Result<DocumentRows> {
        self.inner.query(query).await
    }

    async fn ensure_primary_index(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let checkpoint = self.inner.checkpoint().await;
        self.inner.ensure_primary_index().await?;
        self.flush_or_rollback(checkpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("absent.store"));
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("nested").join("default.store"));
        let snapshot = BucketSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            bucket: "default".to_string(),
            primary_index: true,
            last_cas: 3,
            documents: vec![SnapshotDocument {
                id: "p::a".to_string(),
                cas: 3,
                content: json!({"title": "A", "upVotes": 2}),
            }],
        };

        file.save(&snapshot).await.unwrap();
        assert!(!file.path().with_extension("tmp").exists());
        assert_eq!(file.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.store");
        std::fs::write(&path, b"not messagepack").unwrap();
        let err = FileDocumentStore::open(&path, "broken").await.err().unwrap();
        assert!(matches!(err, PersistError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_failed_flush_rolls_back_update_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.store");
        let store = FileDocumentStore::open(&path, "default").await.unwrap();
        let rev = store.create("a", json!({"n": 1})).await.unwrap();

        let blocker = path.with_extension("tmp");
        std::fs::create_dir(&blocker).unwrap();

        let err = store.update(&rev, json!({"n": 2})).await.unwrap_err();
        assert!(matches!(err, PersistError::StorageUnavailable(_)));
        let err = store.ensure_primary_index().await.unwrap_err();
        assert!(matches!(err, PersistError::StorageUnavailable(_)));

        assert_eq!(store.get("a").await.unwrap().revision, rev);
        assert_eq!(store.get("a").await.unwrap().content, json!({"n": 1}));
        assert!(!store.inner.has_primary_index().await);

        std::fs::remove_dir(&blocker).unwrap();
        let next = store.update(&rev, json!({"n": 3})).await.unwrap();
        assert_eq!(next.cas(), rev.cas() + 1);
        store.ensure_primary_index().await.unwrap();
    }

    #[tokio::test]
    async fn test_bucket_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talks.store");
        let store = FileDocumentStore::open(&path, "talks").await.unwrap();
        store.create("a", json!({})).await.unwrap();

        let err = FileDocumentStore::open(&path, "other").await.err().unwrap();
        assert!(matches!(err, PersistError::Validation(_)));
    }
}
