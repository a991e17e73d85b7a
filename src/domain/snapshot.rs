use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::ports::SnapshotStore;
use crate::domain::product::ProductRecord;

/// In-memory implementation of [`SnapshotStore`].
///
/// Keeps the snapshot as serialised JSON text, like a browser's local
/// storage slot, so tests exercise the same encode/decode path as the file
/// store. Writes can be made to fail to simulate a full disk.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<String>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: &[ProductRecord]) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.slot.lock() {
            *slot = serde_json::to_string(records).ok();
        }
        store
    }

    /// Put raw text in the slot, valid JSON or not.
    pub fn with_raw(text: impl Into<String>) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.slot.lock() {
            *slot = Some(text.into());
        }
        store
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<Vec<ProductRecord>>> {
        let text = match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => bail!("snapshot slot poisoned"),
        };
        text.map(|t| serde_json::from_str(&t).context("Failed to parse local snapshot"))
            .transpose()
    }

    async fn save(&self, records: &[ProductRecord]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("local snapshot quota exceeded");
        }
        let text = serde_json::to_string(records)?;
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(text),
            Err(_) => bail!("snapshot slot poisoned"),
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
