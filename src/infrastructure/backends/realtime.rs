use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::document::{to_records, StoredDocument};
use crate::domain::fingerprint::fingerprint;
use crate::domain::merge::without;
use crate::domain::ports::{DocumentStore, ProductBackend, SaveOutcome, SnapshotStore};
use crate::domain::product::ProductRecord;
use crate::domain::subscription::{SnapshotFeed, Subscription};
use crate::domain::value_objects::{Fingerprint, ProductId};
use crate::infrastructure::backends::mirror_local;

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

/// Backend over a document store that pushes changes.
///
/// Each product is one document whose id is the product id. Reads list the
/// collection newest first; the primary delivery path is [`subscribe`].
/// Failed writes are mirrored to the local snapshot and reported as
/// degraded.
///
/// [`subscribe`]: ProductBackend::subscribe
pub struct RealtimeBackend {
    store: Arc<dyn DocumentStore>,
    local: Arc<dyn SnapshotStore>,
}

impl RealtimeBackend {
    pub fn new(store: Arc<dyn DocumentStore>, local: Arc<dyn SnapshotStore>) -> Self {
        Self { store, local }
    }

    async fn sync_documents(&self, records: &[ProductRecord]) -> Result<()> {
        let current = self.store.list().await?;
        let wanted: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

        for doc in current.iter().filter(|d| !wanted.contains(d.id.as_str())) {
            self.store
                .remove(&doc.id)
                .await
                .with_context(|| format!("Failed to delete document {}", doc.id))?;
        }

        let stored: HashMap<&str, &StoredDocument> =
            current.iter().map(|d| (d.id.as_str(), d)).collect();
        for record in records {
            let id = record.id.as_str();
            match stored.get(id) {
                None => self
                    .store
                    .create(id, document_fields(record)?)
                    .await
                    .with_context(|| format!("Failed to create document {id}"))?,
                Some(doc) if unstamped(doc.to_record()) != unstamped(record.clone()) => {
                    let mut fields = document_fields(record)?;
                    if let Some(created) = doc.fields.get(CREATED_AT) {
                        fields.insert(CREATED_AT.to_string(), created.clone());
                    }
                    self.store
                        .update(id, fields)
                        .await
                        .with_context(|| format!("Failed to update document {id}"))?;
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    async fn degrade(&self, records: &[ProductRecord]) -> SaveOutcome {
        if mirror_local(self.local.as_ref(), records, self.name()).await {
            SaveOutcome::Degraded
        } else {
            SaveOutcome::Failed
        }
    }
}

/// The product without the stamps this backend adds to its document.
fn unstamped(mut record: ProductRecord) -> ProductRecord {
    record.extra.remove(CREATED_AT);
    record.extra.remove(UPDATED_AT);
    record
}

/// Stored fields of a product: the record plus creation/update stamps.
fn document_fields(record: &ProductRecord) -> Result<Map<String, Value>> {
    let mut fields = record.to_fields()?;
    let now = Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    fields.entry(CREATED_AT).or_insert_with(|| now.clone());
    fields.insert(UPDATED_AT.to_string(), now);
    Ok(fields)
}

#[async_trait]
impl ProductBackend for RealtimeBackend {
    fn name(&self) -> &'static str {
        "realtime"
    }

    async fn fetch_all(&self) -> Result<Vec<ProductRecord>> {
        let docs = self
            .store
            .list()
            .await
            .context("Failed to list realtime documents")?;
        Ok(to_records(&docs))
    }

    async fn replace_all(&self, records: &[ProductRecord]) -> SaveOutcome {
        match self.sync_documents(records).await {
            Ok(()) => SaveOutcome::Saved,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "realtime write failed");
                self.degrade(records).await
            }
        }
    }

    async fn delete_one(&self, id: &ProductId) -> SaveOutcome {
        match self.store.remove(id.as_str()).await {
            Ok(()) => SaveOutcome::Saved,
            Err(e) => {
                warn!(product = %id, error = %format!("{e:#}"), "realtime delete failed");
                let remaining = without(self.local.load_or_empty().await, id);
                self.degrade(&remaining).await
            }
        }
    }

    async fn delete_all(&self) -> SaveOutcome {
        let result: Result<()> = async {
            for doc in self.store.list().await? {
                self.store.remove(&doc.id).await?;
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => SaveOutcome::Saved,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "realtime clear failed");
                self.degrade(&[]).await
            }
        }
    }

    fn subscribe(&self) -> Option<Subscription> {
        let (feed, subscription) = Subscription::channel();
        tokio::spawn(listen(Arc::clone(&self.store), feed));
        Some(subscription)
    }
}

/// Forward every changed snapshot until the consumer unsubscribes or the
/// store reports an error. Errors end the feed; they are not retried.
async fn listen(store: Arc<dyn DocumentStore>, feed: SnapshotFeed) {
    let mut last: Option<Fingerprint> = None;
    loop {
        let next = tokio::select! {
            _ = feed.cancelled() => break,
            next = store.next_snapshot(last.as_ref()) => next,
        };
        match next {
            Ok(docs) => {
                let records = to_records(&docs);
                let fp = fingerprint(&records);
                debug!(products = records.len(), fingerprint = fp.short(), "realtime snapshot");
                last = Some(fp);
                if !feed.send(records).await {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "realtime listener failed");
                break;
            }
        }
    }
    info!("realtime listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::MemorySnapshotStore;
    use crate::infrastructure::memory_documents::MemoryDocumentStore;
    use serde_json::json;
    use std::time::Duration;

    fn product(id: &str, desc: &str) -> ProductRecord {
        ProductRecord {
            description: Some(desc.into()),
            ..ProductRecord::new(id)
        }
    }

    fn setup() -> (Arc<MemoryDocumentStore>, Arc<MemorySnapshotStore>, RealtimeBackend) {
        let store = Arc::new(MemoryDocumentStore::new());
        let local = Arc::new(MemorySnapshotStore::new());
        let backend = RealtimeBackend::new(store.clone(), local.clone());
        (store, local, backend)
    }

    fn ids(records: &[ProductRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    async fn next(sub: &mut Subscription) -> Vec<ProductRecord> {
        tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("no snapshot delivered")
            .expect("feed ended")
    }

    #[tokio::test]
    async fn replace_all_creates_and_removes_documents() {
        let (_, _, backend) = setup();

        assert!(backend.replace_all(&[product("A", "a"), product("B", "b")]).await.is_success());
        assert!(backend.replace_all(&[product("B", "b"), product("C", "c")]).await.is_success());

        let records = backend.fetch_all().await.unwrap();
        assert_eq!(ids(&records), ["C", "B"]);
    }

    #[tokio::test]
    async fn replace_all_rewrites_changed_documents() {
        let (store, _, backend) = setup();
        backend.replace_all(&[product("A", "old"), product("B", "b")]).await;
        let created = store.list().await.unwrap()[1].fields[CREATED_AT].clone();

        let outcome = backend.replace_all(&[product("A", "new"), product("B", "b")]).await;

        assert_eq!(outcome, SaveOutcome::Saved);
        let records = backend.fetch_all().await.unwrap();
        assert_eq!(ids(&records), ["B", "A"]);
        assert_eq!(records[1].description.as_deref(), Some("new"));
        let docs = store.list().await.unwrap();
        assert_eq!(docs[1].fields[CREATED_AT], created);
    }

    #[tokio::test]
    async fn replace_all_leaves_unchanged_documents_alone() {
        let (store, _, backend) = setup();
        backend.replace_all(&[product("A", "a")]).await;
        let before = store.list().await.unwrap()[0].fields[UPDATED_AT].clone();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let loaded = backend.fetch_all().await.unwrap();
        assert!(backend.replace_all(&loaded).await.is_success());

        let after = store.list().await.unwrap()[0].fields[UPDATED_AT].clone();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn stored_documents_carry_timestamps() {
        let (store, _, backend) = setup();
        backend.replace_all(&[product("A", "a")]).await;

        let docs = store.list().await.unwrap();
        assert_eq!(docs[0].id, "A");
        assert!(docs[0].fields.contains_key(CREATED_AT));
        assert!(docs[0].fields.contains_key(UPDATED_AT));
        assert_eq!(docs[0].fields["Product Desc"], json!("a"));
    }

    #[tokio::test]
    async fn delete_one_and_delete_all() {
        let (_, _, backend) = setup();
        backend.replace_all(&[product("A", "a"), product("B", "b")]).await;

        assert!(backend.delete_one(&ProductId::from("A")).await.is_success());
        assert_eq!(ids(&backend.fetch_all().await.unwrap()), ["B"]);

        assert!(backend.delete_one(&ProductId::from("missing")).await.is_success());

        assert!(backend.delete_all().await.is_success());
        assert!(backend.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_mirrors_locally_and_reports_degraded() {
        let (store, local, backend) = setup();
        store.set_unreachable(true);

        assert!(backend.fetch_all().await.is_err());
        assert_eq!(backend.replace_all(&[product("A", "a")]).await, SaveOutcome::Degraded);
        assert_eq!(ids(&local.load_or_empty().await), ["A"]);
        assert_eq!(backend.delete_one(&ProductId::from("A")).await, SaveOutcome::Degraded);
        assert!(local.load_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn subscription_delivers_current_then_each_change() {
        let (store, _, backend) = setup();
        backend.replace_all(&[product("A", "a")]).await;

        let mut sub = backend.subscribe().unwrap();
        assert_eq!(ids(&next(&mut sub).await), ["A"]);

        store
            .create("B", product("B", "b").to_fields().unwrap())
            .await
            .unwrap();
        assert_eq!(ids(&next(&mut sub).await), ["B", "A"]);

        store.remove("A").await.unwrap();
        assert_eq!(ids(&next(&mut sub).await), ["B"]);
    }

    #[tokio::test]
    async fn document_id_overrides_stored_product_id() {
        let (store, _, backend) = setup();
        store
            .create("doc-9", json!({"ProductId": "other"}).as_object().cloned().unwrap())
            .await
            .unwrap();

        let mut sub = backend.subscribe().unwrap();
        assert_eq!(ids(&next(&mut sub).await), ["doc-9"]);
    }

    #[tokio::test]
    async fn listener_error_ends_the_feed() {
        let (store, _, backend) = setup();
        let mut sub = backend.subscribe().unwrap();
        assert!(next(&mut sub).await.is_empty());

        store.set_unreachable(true);
        store.create("X", Map::new()).await.ok();
        store.touch();

        let ended = tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap();
        assert!(ended.is_none());
    }

    async fn wait_for_listeners(store: &MemoryDocumentStore, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.listener_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("listener count never reached {count}"));
    }

    #[tokio::test]
    async fn unsubscribe_stops_the_listener() {
        let (store, _, backend) = setup();
        let mut sub = backend.subscribe().unwrap();
        next(&mut sub).await;
        wait_for_listeners(&store, 1).await;

        sub.unsubscribe();
        wait_for_listeners(&store, 0).await;

        // Changes after unsubscribing reach no one.
        store.create("A", Map::new()).await.unwrap();
        assert_eq!(store.listener_count(), 0);
    }
}
