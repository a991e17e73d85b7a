use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

use crate::domain::document::{listing_fingerprint, sort_newest_first, StoredDocument};
use crate::domain::ports::DocumentStore;
use crate::domain::value_objects::Fingerprint;

/// In-process document store.
///
/// Creation times come from a sequence counter, so documents created in
/// one burst still have a strict order. Every mutation bumps a revision on
/// a `watch` channel, which is what wakes [`DocumentStore::next_snapshot`].
#[derive(Debug)]
pub struct MemoryDocumentStore {
    docs: Mutex<Vec<StoredDocument>>,
    epoch: DateTime<Utc>,
    sequence: AtomicI64,
    revision: watch::Sender<u64>,
    unreachable: AtomicBool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            docs: Mutex::new(Vec::new()),
            epoch: Utc::now(),
            sequence: AtomicI64::new(0),
            revision,
            unreachable: AtomicBool::new(false),
        }
    }

    /// Make every call fail, as if the network were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Wake waiting listeners without changing anything.
    pub fn touch(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Number of [`DocumentStore::next_snapshot`] calls currently waiting.
    pub fn listener_count(&self) -> usize {
        self.revision.receiver_count()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            bail!("document store unreachable");
        }
        Ok(())
    }

    fn next_id(&self) -> String {
        format!("doc-{}", self.sequence.load(Ordering::SeqCst) + 1)
    }

    fn with_docs<T>(&self, f: impl FnOnce(&mut Vec<StoredDocument>) -> T) -> Result<T> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| anyhow!("document store poisoned"))?;
        Ok(f(&mut docs))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self) -> Result<Vec<StoredDocument>> {
        self.check_reachable()?;
        let mut docs = self.with_docs(|docs| docs.clone())?;
        sort_newest_first(&mut docs);
        Ok(docs)
    }

    async fn create(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        self.check_reachable()?;
        let id = if id.is_empty() { self.next_id() } else { id.to_string() };
        let created = self.with_docs(|docs| {
            if docs.iter().any(|d| d.id == id) {
                return false;
            }
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            docs.push(StoredDocument {
                id: id.clone(),
                created_at: self.epoch + Duration::milliseconds(seq),
                fields,
            });
            true
        })?;
        if !created {
            bail!("document {id} already exists");
        }
        self.touch();
        Ok(())
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        self.check_reachable()?;
        let replaced = self.with_docs(|docs| match docs.iter_mut().find(|d| d.id == id) {
            Some(doc) => {
                doc.fields = fields.clone();
                true
            }
            None => false,
        })?;
        if !replaced {
            return self.create(id, fields).await;
        }
        self.touch();
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.check_reachable()?;
        let removed = self.with_docs(|docs| {
            let before = docs.len();
            docs.retain(|d| d.id != id);
            before != docs.len()
        })?;
        if removed {
            self.touch();
        }
        Ok(())
    }

    async fn next_snapshot(&self, previous: Option<&Fingerprint>) -> Result<Vec<StoredDocument>> {
        let mut revision = self.revision.subscribe();
        loop {
            let docs = self.list().await?;
            if previous != Some(&listing_fingerprint(&docs)) {
                return Ok(docs);
            }
            revision
                .changed()
                .await
                .map_err(|_| anyhow!("document store closed"))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let store = MemoryDocumentStore::new();
        store.create("a", Map::new()).await.unwrap();
        store.create("b", Map::new()).await.unwrap();
        store.create("c", Map::new()).await.unwrap();

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = MemoryDocumentStore::new();
        store.create("a", fields(json!({"x": 1}))).await.unwrap();
        assert!(store.create("a", fields(json!({"x": 2}))).await.is_err());
        assert_eq!(store.list().await.unwrap()[0].fields["x"], json!(1));
    }

    #[tokio::test]
    async fn empty_id_gets_generated() {
        let store = MemoryDocumentStore::new();
        store.create("", Map::new()).await.unwrap();
        assert_eq!(store.list().await.unwrap()[0].id, "doc-1");
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_keeps_creation_time() {
        let store = MemoryDocumentStore::new();
        store.create("a", fields(json!({"x": 1, "y": 2}))).await.unwrap();
        let created = store.list().await.unwrap()[0].created_at;

        store.update("a", fields(json!({"x": 3}))).await.unwrap();
        store.update("b", fields(json!({"x": 4}))).await.unwrap();

        let docs = store.list().await.unwrap();
        let a = docs.iter().find(|d| d.id == "a").unwrap();
        assert_eq!(a.fields, fields(json!({"x": 3})));
        assert_eq!(a.created_at, created);
        assert_eq!(docs[0].id, "b");
    }

    #[tokio::test]
    async fn removing_missing_document_succeeds() {
        let store = MemoryDocumentStore::new();
        assert!(store.remove("nope").await.is_ok());
    }

    #[tokio::test]
    async fn next_snapshot_waits_for_a_change() {
        let store = std::sync::Arc::new(MemoryDocumentStore::new());
        let first = store.next_snapshot(None).await.unwrap();
        let fp = listing_fingerprint(&first);

        let waiter = {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move { store.next_snapshot(Some(&fp)).await })
        };
        tokio::task::yield_now().await;
        store.touch();
        store.create("a", Map::new()).await.unwrap();

        let docs = waiter.await.unwrap().unwrap();
        assert_eq!(docs.len(), 1);
    }
}
