use super::persistence::{BucketSnapshot, SNAPSHOT_FORMAT_VERSION, SnapshotDocument};
use super::{DocumentQuery, DocumentRows, DocumentStore, Revision, ScanConsistency, StoredDocument};
use crate::core::{PersistError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    cas: u64,
    content: JsonValue,
}

#[derive(Debug, Clone, Default)]
struct BucketState {
    documents: BTreeMap<String, Entry>,
    last_cas: u64,
    primary_index: bool,
    /// What queries see: lags behind `documents` until the next catch-up.
    index: BTreeMap<String, JsonValue>,
    /// Identifiers written since the last catch-up.
    pending: BTreeSet<String>,
}

impl BucketState {
    fn next_cas(&mut self) -> u64 {
        self.last_cas += 1;
        self.last_cas
    }

    fn catch_up_index(&mut self) {
        for id in std::mem::take(&mut self.pending) {
            if let Some(entry) = self.documents.get(&id) {
                self.index.insert(id, entry.content.clone());
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.pending.clear();
        self.index = self
            .documents
            .iter()
            .map(|(id, entry)| (id.clone(), entry.content.clone()))
            .collect();
    }
}

/// Bucket state captured before a write so a caller can undo it.
pub(crate) struct Checkpoint {
    state: BucketState,
    writes: u64,
}

/// Document bucket held entirely in memory.
///
/// The primary index trails writes the way a distributed index service does:
/// `NotBounded` queries read it as of the last catch-up, `RequestPlus`
/// queries catch it up first.
pub struct InMemoryDocumentStore {
    bucket: String,
    state: RwLock<BucketState>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: RwLock::new(BucketState::default()),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    /// Rebuilds a bucket from a snapshot taken with [`Self::export_snapshot`].
    pub fn from_snapshot(snapshot: BucketSnapshot) -> Result<Self> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::StorageUnavailable(format!(
                "Unsupported snapshot format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let mut state = BucketState {
            primary_index: snapshot.primary_index,
            last_cas: snapshot.last_cas,
            ..BucketState::default()
        };
        for document in snapshot.documents {
            state.last_cas = state.last_cas.max(document.cas);
            state.documents.insert(
                document.id,
                Entry {
                    cas: document.cas,
                    content: document.content,
                },
            );
        }
        if state.primary_index {
            state.rebuild_index();
        }

        Ok(Self {
            bucket: snapshot.bucket,
            state: RwLock::new(state),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        })
    }

    pub async fn export_snapshot(&self) -> BucketSnapshot {
        let state = self.state.read().await;
        BucketSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            bucket: self.bucket.clone(),
            primary_index: state.primary_index,
            last_cas: state.last_cas,
            documents: state
                .documents
                .iter()
                .map(|(id, entry)| SnapshotDocument {
                    id: id.clone(),
                    cas: entry.cas,
                    content: entry.content.clone(),
                })
                .collect(),
        }
    }

    /// Simulates losing (or regaining) the connection to the bucket.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful creates and updates.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn has_primary_index(&self) -> bool {
        self.state.read().await.primary_index
    }

    /// Applies every queued write to the index.
    pub async fn sync_index(&self) {
        self.state.write().await.catch_up_index();
    }

    pub(crate) async fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.read().await.clone(),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    /// Puts the bucket back exactly as it was when `checkpoint` was taken.
    pub(crate) async fn rollback(&self, checkpoint: Checkpoint) {
        *self.state.write().await = checkpoint.state;
        self.writes.store(checkpoint.writes, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PersistError::StorageUnavailable(format!(
                "bucket '{}' is not reachable",
                self.bucket
            )))
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, id: &str) -> Result<StoredDocument> {
        self.check_available()?;
        let state = self.state.read().await;
        let entry = state
            .documents
            .get(id)
            .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
        Ok(StoredDocument::new(
            Revision::new(id, entry.cas),
            entry.content.clone(),
        ))
    }

    async fn create(&self, id: &str, content: JsonValue) -> Result<Revision> {
        self.check_available()?;
        if id.is_empty() {
            return Err(PersistError::Validation(
                "document identifier must not be empty".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if state.documents.contains_key(id) {
            return Err(PersistError::IdentifierConflict(id.to_string()));
        }

        let cas = state.next_cas();
        state.documents.insert(id.to_string(), Entry { cas, content });
        state.pending.insert(id.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(bucket = %self.bucket, id, cas, "document created");
        Ok(Revision::new(id, cas))
    }

    async fn update(&self, revision: &Revision, content: JsonValue) -> Result<Revision> {
        self.check_available()?;
        let id = revision.id();

        let mut state = self.state.write().await;
        let current = state
            .documents
            .get(id)
            .map(|entry| entry.cas)
            .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
        if revision.is_versioned() && revision.cas() != current {
            return Err(PersistError::Conflict(id.to_string()));
        }

        let cas = state.next_cas();
        state.documents.insert(id.to_string(), Entry { cas, content });
        state.pending.insert(id.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(bucket = %self.bucket, id, cas, "document replaced");
        Ok(Revision::new(id, cas))
    }

    async fn query(&self, query: &DocumentQuery) -> Result<DocumentRows> {
        self.check_available()?;

        let mut state = self.state.write().await;
        if !state.primary_index {
            return Err(PersistError::Query(format!(
                "No index available on keyspace {} that matches your query",
                self.bucket
            )));
        }
        if query.consistency == ScanConsistency::RequestPlus {
            state.catch_up_index();
        }

        let candidates: Vec<StoredDocument> = state
            .index
            .iter()
            .map(|(id, content)| StoredDocument::new(Revision::unversioned(id.as_str()), content.clone()))
            .collect();
        drop(state);

        let rows = query.apply(candidates);
        debug!(bucket = %self.bucket, rows = rows.len(), consistency = query.consistency.as_str(), "query executed");
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn ensure_primary_index(&self) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.primary_index {
            return Err(PersistError::IndexExists(format!(
                "The index #primary already exists on {}",
                self.bucket
            )));
        }
        state.primary_index = true;
        state.rebuild_index();
        Ok(())
    }
}
