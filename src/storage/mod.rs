//! Storage collaborator contract.
//!
//! Everything above this module talks to a bucket of JSON documents through
//! [`DocumentStore`]. Implementations decide how documents are kept; the
//! persistence layer only relies on the semantics documented on each method.

pub mod memory;
pub mod persistence;
pub mod query;

pub use memory::InMemoryDocumentStore;
pub use persistence::{BucketSnapshot, FileDocumentStore, SnapshotDocument, SnapshotFile};
pub use query::{DocumentQuery, Filter, ScanConsistency, Sort, SortDirection, SortExpr};

use crate::core::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Opaque reference to the stored version of a document.
///
/// A revision names the document it belongs to and carries a CAS token.
/// A token of `0` is unversioned: updates addressed by it are unconditional.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    id: String,
    cas: u64,
}

impl Revision {
    pub fn new(id: impl Into<String>, cas: u64) -> Self {
        Self { id: id.into(), cas }
    }

    /// Revision for a document observed without its CAS (e.g. a query row).
    pub fn unversioned(id: impl Into<String>) -> Self {
        Self::new(id, 0)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cas(&self) -> u64 {
        self.cas
    }

    pub fn is_versioned(&self) -> bool {
        self.cas != 0
    }
}

/// A document as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub revision: Revision,
    pub content: JsonValue,
}

impl StoredDocument {
    pub fn new(revision: Revision, content: JsonValue) -> Self {
        Self { revision, content }
    }

    pub fn id(&self) -> &str {
        self.revision.id()
    }
}

/// One-shot stream of query rows.
pub type DocumentRows = BoxStream<'static, Result<StoredDocument>>;

/// A bucket of JSON documents addressed by string identifiers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the bucket (storage namespace) this store serves.
    fn bucket(&self) -> &str;

    /// Fetches a document and its current revision.
    ///
    /// Fails with `NotFound` when no document has this identifier.
    async fn get(&self, id: &str) -> Result<StoredDocument>;

    /// Inserts a new document.
    ///
    /// Fails with `IdentifierConflict` when the identifier is taken.
    async fn create(&self, id: &str, content: JsonValue) -> Result<Revision>;

    /// Replaces the document named by `revision`.
    ///
    /// Fails with `NotFound` when the document is gone and with `Conflict`
    /// when a versioned revision no longer matches the stored one.
    async fn update(&self, revision: &Revision, content: JsonValue) -> Result<Revision>;

    /// Runs a filtered, ordered query. Rows carry unversioned revisions.
    async fn query(&self, query: &DocumentQuery) -> Result<DocumentRows>;

    /// Creates the primary index. Fails with `IndexExists` when it is already there.
    async fn ensure_primary_index(&self) -> Result<()>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn bucket(&self) -> &str {
        (**self).bucket()
    }

    async fn get(&self, id: &str) -> Result<StoredDocument> {
        (**self).get(id).await
    }

    async fn create(&self, id: &str, content: JsonValue) -> Result<Revision> {
        (**self).create(id, content).await
    }

    async fn update(&self, revision: &Revision, content: JsonValue) -> Result<Revision> {
        (**self).update(revision, content).await
    }

    async fn query(&self, query: &DocumentQuery) -> Result<DocumentRows> {
        (**self).query(query).await
    }

    async fn ensure_primary_index(&self) -> Result<()> {
        (**self).ensure_primary_index().await
    }
}
