use crate::domain::{
    document::StoredDocument,
    merge::without,
    product::ProductRecord,
    subscription::Subscription,
    value_objects::{Fingerprint, ProductId},
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

/// Result of a write through a backend.
///
/// Only [`SaveOutcome::Saved`] counts as success. `Degraded` means the
/// primary store rejected the write and the records only reached the local
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Degraded,
    Failed,
}

impl SaveOutcome {
    pub fn is_success(self) -> bool {
        self == SaveOutcome::Saved
    }
}

/// Port: one persistence strategy for the whole product collection
/// (implemented by LocalBackend, RemoteDocumentBackend, GitFileBackend,
/// RealtimeBackend).
#[async_trait]
pub trait ProductBackend: Send + Sync {
    /// Short label used in logs ("local", "remote", "git", "realtime").
    fn name(&self) -> &'static str;

    /// Full current collection. Pull backends fall back to the local
    /// snapshot instead of failing.
    async fn fetch_all(&self) -> Result<Vec<ProductRecord>>;

    /// Overwrite the whole collection.
    async fn replace_all(&self, records: &[ProductRecord]) -> SaveOutcome;

    /// Read-modify-write removal of one product. Not guarded against a
    /// concurrent writer: the last `replace_all` wins.
    async fn delete_one(&self, id: &ProductId) -> SaveOutcome {
        match self.fetch_all().await {
            Ok(records) => self.replace_all(&without(records, id)).await,
            Err(e) => {
                warn!(backend = self.name(), product = %id, error = %e, "delete aborted: fetch failed");
                SaveOutcome::Failed
            }
        }
    }

    async fn delete_all(&self) -> SaveOutcome {
        self.replace_all(&[]).await
    }

    /// Push delivery of full snapshots, for backends that support it.
    fn subscribe(&self) -> Option<Subscription> {
        None
    }
}

/// Port: the local fallback slot every backend may read or overwrite
/// (implemented by FileSnapshotStore, MemorySnapshotStore).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `None` when nothing was ever saved.
    async fn load(&self) -> Result<Option<Vec<ProductRecord>>>;

    /// Replace the stored snapshot.
    async fn save(&self, records: &[ProductRecord]) -> Result<()>;

    /// Last saved snapshot, or an empty collection when there is none or it
    /// cannot be read.
    async fn load_or_empty(&self) -> Vec<ProductRecord> {
        match self.load().await {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "local snapshot unreadable, using empty collection");
                Vec::new()
            }
        }
    }
}

/// Port: a document collection with server-assigned creation times
/// (implemented by FirestoreDocumentStore, MemoryDocumentStore).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document, newest first.
    async fn list(&self) -> Result<Vec<StoredDocument>>;

    /// Create the document `id`. The store assigns its creation time.
    async fn create(&self, id: &str, fields: Map<String, Value>) -> Result<()>;

    /// Overwrite every field of document `id`, creating it if missing. An
    /// existing document keeps its creation time.
    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()>;

    /// Delete the document `id`. Deleting a missing document succeeds.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Wait until the collection's fingerprint differs from `previous`, then
    /// return the new listing. `None` returns the current listing at once.
    async fn next_snapshot(&self, previous: Option<&Fingerprint>) -> Result<Vec<StoredDocument>>;
}
