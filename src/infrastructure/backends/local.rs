use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::ports::{ProductBackend, SaveOutcome, SnapshotStore};
use crate::domain::product::ProductRecord;
use crate::infrastructure::backends::mirror_local;

/// Backend that only ever touches the local snapshot.
pub struct LocalBackend {
    local: Arc<dyn SnapshotStore>,
}

impl LocalBackend {
    pub fn new(local: Arc<dyn SnapshotStore>) -> Self {
        Self { local }
    }
}

#[async_trait]
impl ProductBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_all(&self) -> Result<Vec<ProductRecord>> {
        Ok(self.local.load_or_empty().await)
    }

    async fn replace_all(&self, records: &[ProductRecord]) -> SaveOutcome {
        if mirror_local(self.local.as_ref(), records, self.name()).await {
            SaveOutcome::Saved
        } else {
            SaveOutcome::Failed
        }
    }
}
