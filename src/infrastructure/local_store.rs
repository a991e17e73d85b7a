use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::ports::SnapshotStore;
use crate::domain::product::ProductRecord;

/// Local snapshot kept as one JSON array in one file.
///
/// Every save rewrites the whole file: the array goes to a temp file next to
/// the target which is then renamed over it, so a crash never leaves half a
/// snapshot behind.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<Vec<ProductRecord>>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read local snapshot: {}", self.path.display())
                })
            }
        };
        let records = serde_json::from_str(&text).with_context(|| {
            format!("Failed to parse local snapshot: {}", self.path.display())
        })?;
        Ok(Some(records))
    }

    async fn save(&self, records: &[ProductRecord]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let text = serde_json::to_string(records)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, text.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e)
                .with_context(|| format!("Failed to replace {}", self.path.display()));
        }

        debug!(path = %self.path.display(), products = records.len(), "local snapshot saved");
        Ok(())
    }
}
