use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::ports::{ProductBackend, SaveOutcome, SnapshotStore};
use crate::domain::product::ProductRecord;
use crate::infrastructure::backends::mirror_local;
use crate::infrastructure::config::GitConfig;
use crate::infrastructure::http;

const ACCEPT: &str = "application/vnd.github.v3+json";

/// A file as returned by the contents API.
#[derive(Debug, Deserialize)]
struct ContentFile {
    /// Base64, wrapped at 60 columns.
    #[serde(default)]
    content: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct ContentUpdate<'a> {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

/// Backend storing the collection as a JSON file committed to a Git host.
///
/// Every write is a commit that must name the blob it replaces, so a save
/// first reads the current file hash. Reads fall back to the local snapshot
/// and every write is mirrored to it.
pub struct GitFileBackend {
    client: Client,
    cfg: GitConfig,
    local: Arc<dyn SnapshotStore>,
}

impl GitFileBackend {
    pub fn new(client: Client, cfg: GitConfig, local: Arc<dyn SnapshotStore>) -> Self {
        Self { client, cfg, local }
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.cfg.api_url.trim_end_matches('/'),
            self.cfg.owner,
            self.cfg.repo,
            self.cfg.path.trim_start_matches('/')
        )
    }

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, ACCEPT);
        match self.cfg.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    async fn get_file(&self) -> Result<Option<ContentFile>> {
        let url = self.contents_url();
        let mut request = self.authorise(self.client.get(&url));
        if let Some(branch) = &self.cfg.branch {
            request = request.query(&[("ref", branch)]);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let Some(response) = http::found(response, "contents read").await? else {
            return Ok(None);
        };
        let file = response
            .json()
            .await
            .context("Failed to parse contents response")?;
        Ok(Some(file))
    }

    async fn put_file(&self, records: &[ProductRecord], sha: Option<String>) -> Result<()> {
        let url = self.contents_url();
        let body = ContentUpdate {
            message: commit_message(),
            content: encode_records(records)?,
            sha,
            branch: self.cfg.branch.as_deref(),
        };
        let response = self
            .authorise(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("PUT {url}"))?;
        http::success(response, "contents write").await
    }

    async fn get_remote(&self) -> Result<Vec<ProductRecord>> {
        match self.get_file().await? {
            Some(file) => decode_records(&file.content),
            None => Ok(Vec::new()),
        }
    }

    async fn put_remote(&self, records: &[ProductRecord]) -> Result<()> {
        // An unreadable file is treated as new: the write then fails on its
        // own if the file does exist.
        let sha = match self.get_file().await {
            Ok(file) => file.map(|f| f.sha),
            Err(e) => {
                debug!(error = %format!("{e:#}"), "no current file hash");
                None
            }
        };
        self.put_file(records, sha).await
    }
}

fn commit_message() -> String {
    format!(
        "Update products - {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn encode_records(records: &[ProductRecord]) -> Result<String> {
    let json = serde_json::to_string_pretty(records)?;
    Ok(STANDARD.encode(json))
}

fn decode_records(content: &str) -> Result<Vec<ProductRecord>> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .context("File content is not valid base64")?;
    serde_json::from_slice(&bytes).context("File content is not a product array")
}

#[async_trait]
impl ProductBackend for GitFileBackend {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn fetch_all(&self) -> Result<Vec<ProductRecord>> {
        match self.get_remote().await {
            Ok(records) => {
                debug!(products = records.len(), path = %self.cfg.path, "catalog file read");
                Ok(records)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "catalog file unreachable, reading local snapshot");
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
                warn!(error = %format!("{e:#}"), mirrored, "catalog commit failed");
                if mirrored {
                    SaveOutcome::Degraded
                } else {
                    SaveOutcome::Failed
                }
            }
        }
    }
}
