use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::document::{listing_fingerprint, sort_newest_first, StoredDocument};
use crate::domain::ports::DocumentStore;
use crate::domain::value_objects::Fingerprint;
use crate::infrastructure::config::RealtimeConfig;
use crate::infrastructure::http;

const PAGE_SIZE: &str = "300";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreDocument {
    /// `projects/{p}/databases/(default)/documents/{collection}/{id}`
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    create_time: DateTime<Utc>,
}

impl FirestoreDocument {
    fn into_stored(self) -> StoredDocument {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        StoredDocument {
            id,
            created_at: self.create_time,
            fields: decode_fields(self.fields),
        }
    }
}

/// Firestore collection accessed through its REST API.
///
/// Listings are ordered by the server's `createTime`. Firestore's REST
/// surface has no standing listener, so [`DocumentStore::next_snapshot`]
/// re-lists at the configured interval until the collection changes.
pub struct FirestoreDocumentStore {
    client: Client,
    cfg: RealtimeConfig,
}

impl FirestoreDocumentStore {
    pub fn new(client: Client, cfg: RealtimeConfig) -> Self {
        Self { client, cfg }
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.cfg.api_url.trim_end_matches('/'),
            self.cfg.project_id,
            self.cfg.collection
        )
    }

    /// URL of one document. The id is a single, percent-encoded segment.
    fn document_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.collection_url())
            .with_context(|| format!("Invalid Firestore URL: {}", self.cfg.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Firestore URL cannot have a path: {}", self.cfg.api_url))?
            .push(id);
        Ok(url)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.cfg.poll_interval_secs.max(1))
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn list(&self) -> Result<Vec<StoredDocument>> {
        let url = self.collection_url();
        let mut docs = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("key", self.cfg.api_key.as_str()), ("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = request.send().await.with_context(|| format!("GET {url}"))?;
            let Some(response) = http::found(response, "document list").await? else {
                break;
            };
            let page: ListResponse = response
                .json()
                .await
                .context("Failed to parse document list")?;
            docs.extend(page.documents.into_iter().map(FirestoreDocument::into_stored));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        sort_newest_first(&mut docs);
        Ok(docs)
    }

    async fn create(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        let url = self.collection_url();
        let mut request = self
            .client
            .post(&url)
            .query(&[("key", self.cfg.api_key.as_str())]);
        if !id.is_empty() {
            request = request.query(&[("documentId", id)]);
        }
        let response = request
            .json(&json!({ "fields": encode_fields(fields) }))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        http::success(response, "document create").await
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        let url = self.document_url(id)?;
        // No update mask: the stored fields become exactly `fields`.
        let response = self
            .client
            .patch(url.clone())
            .query(&[("key", self.cfg.api_key.as_str())])
            .json(&json!({ "fields": encode_fields(fields) }))
            .send()
            .await
            .with_context(|| format!("PATCH {url}"))?;
        http::success(response, "document update").await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let url = self.document_url(id)?;
        let response = self
            .client
            .delete(url.clone())
            .query(&[("key", self.cfg.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("DELETE {url}"))?;
        // Already gone is as good as deleted.
        http::found(response, "document delete").await?;
        Ok(())
    }

    async fn next_snapshot(&self, previous: Option<&Fingerprint>) -> Result<Vec<StoredDocument>> {
        loop {
            let docs = self.list().await?;
            if previous != Some(&listing_fingerprint(&docs)) {
                return Ok(docs);
            }
            debug!(documents = docs.len(), "collection unchanged");
            tokio::time::sleep(self.poll_interval()).await;
        }
    }
}

// ─── Value codec ──────────────────────────────────────────────────────────────
//
// Firestore wraps every value in a single-key object naming its type.

pub fn encode_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields.into_iter().map(|(k, v)| (k, encode_value(v))).collect()
}

pub fn encode_value(value: Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.into_iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn decode_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields.into_iter().map(|(k, v)| (k, decode_value(v))).collect()
}

pub fn decode_value(value: Value) -> Value {
    let Value::Object(wrapper) = value else {
        return value;
    };
    if wrapper.len() != 1 {
        return Value::Object(wrapper);
    }
    let Some((kind, inner)) = wrapper.into_iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "integerValue" => match &inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(|i| Value::Number(Number::from(i)))
                .unwrap_or(inner),
            _ => inner,
        },
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().cloned().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .cloned()
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        // booleanValue, doubleValue, stringValue, timestampValue,
        // referenceValue, bytesValue, geoPointValue
        _ => inner,
    }
}
