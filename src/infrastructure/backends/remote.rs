use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::ports::{ProductBackend, SaveOutcome, SnapshotStore};
use crate::domain::product::ProductRecord;
use crate::infrastructure::backends::mirror_local;
use crate::infrastructure::config::RemoteConfig;
use crate::infrastructure::http;

const MASTER_KEY_HEADER: &str = "X-Master-Key";

/// Body of a bin read: the stored array sits under `record`.
#[derive(Debug, Deserialize)]
struct BinDocument {
    #[serde(default)]
    record: Option<Vec<ProductRecord>>,
}

/// Backend storing the collection as one JSON document on a bin service.
///
/// Reads fall back to the local snapshot; every write is mirrored to it.
pub struct RemoteDocumentBackend {
    client: Client,
    cfg: RemoteConfig,
    local: Arc<dyn SnapshotStore>,
}

impl RemoteDocumentBackend {
    pub fn new(client: Client, cfg: RemoteConfig, local: Arc<dyn SnapshotStore>) -> Self {
        Self { client, cfg, local }
    }

    fn bin_url(&self) -> String {
        format!("{}/{}", self.cfg.api_url.trim_end_matches('/'), self.cfg.bin_id)
    }

    async fn get_remote(&self) -> Result<Vec<ProductRecord>> {
        let url = format!("{}/latest", self.bin_url());
        let response = self
            .client
            .get(&url)
            .header(MASTER_KEY_HEADER, &self.cfg.master_key)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        // A bin that was never written is an empty catalog.
        let Some(response) = http::found(response, "bin read").await? else {
            return Ok(Vec::new());
        };
        let doc: BinDocument = response
            .json()
            .await
            .context("Failed to parse bin document")?;
        Ok(doc.record.unwrap_or_default())
    }

    async fn put_remote(&self, records: &[ProductRecord]) -> Result<()> {
        let url = self.bin_url();
        let response = self
            .client
            .put(&url)
            .header(MASTER_KEY_HEADER, &self.cfg.master_key)
            .json(records)
            .send()
            .await
            .with_context(|| format!("PUT {url}"))?;
        http::success(response, "bin write").await
    }
}

#[async_trait]
impl ProductBackend for RemoteDocumentBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn fetch_all(&self) -> Result<Vec<ProductRecord>> {
        match self.get_remote().await {
            Ok(records) => {
                debug!(products = records.len(), "bin read");
                Ok(records)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "bin unreachable, reading local snapshot");
                Ok(self.local.load_or_empty().await)
            }
        }
    }

    async fn replace_all(&self, records: &[ProductRecord]) -> SaveOutcome {
        let remote = self.put_remote(records).await;
        let mirrored = mirror_local(self.local.as_ref(), records, self.name()).await;
        match remote {
            Ok(()) => SaveOutcome::Saved,
            Err(e) => {
                warn!(error = %format!("{e:#}"), mirrored, "bin write failed");
                if mirrored {
                    SaveOutcome::Degraded
                } else {
                    SaveOutcome::Failed
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::MemorySnapshotStore;
    use crate::domain::value_objects::ProductId;
    use crate::infrastructure::backends::test_support::{serve, unreachable};
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Bin {
        record: Arc<Mutex<Option<Value>>>,
        puts: Arc<Mutex<usize>>,
    }

    fn authorised(headers: &HeaderMap) -> bool {
        headers.get(MASTER_KEY_HEADER).and_then(|v| v.to_str().ok()) == Some("secret")
    }

    async fn read(State(bin): State<Bin>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        if !authorised(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let record = bin.record.lock().unwrap().clone();
        match record {
            Some(record) => Ok(Json(json!({ "record": record, "metadata": {} }))),
            None => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn write(State(bin): State<Bin>, headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
        if !authorised(&headers) {
            return StatusCode::UNAUTHORIZED;
        }
        *bin.record.lock().unwrap() = Some(body);
        *bin.puts.lock().unwrap() += 1;
        StatusCode::OK
    }

    async fn fake_bin(bin: Bin) -> String {
        let app = Router::new()
            .route("/b/{id}/latest", get(read))
            .route("/b/{id}", axum::routing::put(write))
            .with_state(bin);
        format!("{}/b", serve(app).await)
    }

    fn backend(api_url: String, key: &str, local: Arc<MemorySnapshotStore>) -> RemoteDocumentBackend {
        RemoteDocumentBackend::new(
            http::build_client().unwrap(),
            RemoteConfig {
                api_url,
                bin_id: "catalog".into(),
                master_key: key.into(),
            },
            local,
        )
    }

    #[tokio::test]
    async fn missing_bin_reads_as_empty() {
        let url = fake_bin(Bin::default()).await;
        let local = Arc::new(MemorySnapshotStore::with_records(&[ProductRecord::new("LOCAL")]));
        let b = backend(url, "secret", local);

        assert!(b.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_then_read_and_mirror() {
        let bin = Bin::default();
        let url = fake_bin(bin.clone()).await;
        let local = Arc::new(MemorySnapshotStore::new());
        let b = backend(url, "secret", Arc::clone(&local));
        let records = vec![ProductRecord::new("A"), ProductRecord::new("B")];

        assert_eq!(b.replace_all(&records).await, SaveOutcome::Saved);

        assert_eq!(b.fetch_all().await.unwrap(), records);
        assert_eq!(local.load_or_empty().await, records);
        assert_eq!(*bin.puts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_one_rewrites_the_bin() {
        let bin = Bin::default();
        *bin.record.lock().unwrap() = Some(json!([{"ProductId": "A"}, {"ProductId": "B"}]));
        let url = fake_bin(bin.clone()).await;
        let b = backend(url, "secret", Arc::new(MemorySnapshotStore::new()));

        assert!(b.delete_one(&ProductId::from("B")).await.is_success());

        assert_eq!(*bin.record.lock().unwrap(), Some(json!([{"ProductId": "A"}])));
    }

    #[tokio::test]
    async fn rejected_key_falls_back_to_local() {
        let bin = Bin::default();
        *bin.record.lock().unwrap() = Some(json!([{"ProductId": "REMOTE"}]));
        let url = fake_bin(bin).await;
        let local = Arc::new(MemorySnapshotStore::with_records(&[ProductRecord::new("LOCAL")]));
        let b = backend(url, "wrong", local);

        assert_eq!(b.fetch_all().await.unwrap(), vec![ProductRecord::new("LOCAL")]);
    }

    #[tokio::test]
    async fn unreachable_store_degrades_to_local() {
        let local = Arc::new(MemorySnapshotStore::with_records(&[ProductRecord::new("CACHED")]));
        let b = backend(unreachable().await, "secret", Arc::clone(&local));

        assert_eq!(b.fetch_all().await.unwrap(), vec![ProductRecord::new("CACHED")]);

        let outcome = b.replace_all(&[ProductRecord::new("NEW")]).await;
        assert_eq!(outcome, SaveOutcome::Degraded);
        assert!(!outcome.is_success());
        assert_eq!(local.load_or_empty().await, vec![ProductRecord::new("NEW")]);
    }

    #[tokio::test]
    async fn unreachable_store_without_snapshot_is_empty() {
        let b = backend(unreachable().await, "secret", Arc::new(MemorySnapshotStore::new()));
        assert!(b.fetch_all().await.unwrap().is_empty());
    }
}
