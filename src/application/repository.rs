use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::application::monitoring::{MonitoringBackend, PerfReport};
use crate::domain::ports::{ProductBackend, SaveOutcome, SnapshotStore};
use crate::domain::product::ProductRecord;
use crate::domain::subscription::Subscription;
use crate::domain::value_objects::ProductId;
use crate::infrastructure::backends::{
    GitFileBackend, LocalBackend, RealtimeBackend, RemoteDocumentBackend,
};
use crate::infrastructure::config::{AppConfig, BackendChoice, RealtimeConfig};
use crate::infrastructure::firestore::FirestoreDocumentStore;
use crate::infrastructure::http::build_client;
use crate::infrastructure::local_store::FileSnapshotStore;

/// File name `export_to_file` always writes.
pub const EXPORT_FILE_NAME: &str = "catalog-products-export.json";

/// The backend a repository settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
    Git,
    Realtime,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
            BackendKind::Git => "git",
            BackendKind::Realtime => "realtime",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `import_from_file` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The collection was replaced; callers should reload.
    Replaced { count: usize },
    /// The file held valid JSON that is not an array. Nothing changed.
    NotAnArray,
    /// The backend did not persist the imported collection.
    NotSaved(SaveOutcome),
}

/// Decide which backend a configuration asks for.
///
/// `Auto` picks realtime only when its descriptor carries real credentials.
/// Explicit choices must have their section configured.
pub fn select_backend(cfg: &AppConfig) -> Result<BackendKind> {
    let kind = match cfg.backend {
        BackendChoice::Auto => {
            if cfg.realtime.as_ref().is_some_and(RealtimeConfig::is_usable) {
                BackendKind::Realtime
            } else {
                BackendKind::Local
            }
        }
        BackendChoice::Local => BackendKind::Local,
        BackendChoice::Remote => {
            if cfg.remote.is_none() {
                bail!("backend = \"remote\" requires a [remote] section");
            }
            BackendKind::Remote
        }
        BackendChoice::Git => {
            if cfg.git.is_none() {
                bail!("backend = \"git\" requires a [git] section");
            }
            BackendKind::Git
        }
        BackendChoice::Realtime => match &cfg.realtime {
            Some(rt) if rt.is_usable() => BackendKind::Realtime,
            Some(_) => bail!("[realtime] still holds placeholder credentials"),
            None => bail!("backend = \"realtime\" requires a [realtime] section"),
        },
    };
    Ok(kind)
}

/// Single CRUD surface over whichever backend was selected at start-up.
///
/// Every backend call goes through a [`MonitoringBackend`], so
/// [`ProductRepository::perf_report`] covers the whole session.
pub struct ProductRepository {
    kind: BackendKind,
    backend: Arc<dyn ProductBackend>,
    report: Arc<Mutex<PerfReport>>,
}

impl ProductRepository {
    /// Wrap an already-built backend.
    pub fn new(kind: BackendKind, backend: Arc<dyn ProductBackend>) -> Self {
        let report = PerfReport::new();
        let backend = Arc::new(MonitoringBackend::new(backend, Arc::clone(&report)));
        Self {
            kind,
            backend,
            report,
        }
    }

    /// Select and build the backend named by `cfg`, with the local snapshot
    /// on disk.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let local: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(cfg.snapshot_path()));
        Self::with_snapshot_store(cfg, local)
    }

    /// Like [`ProductRepository::from_config`] with a caller-provided local
    /// snapshot store.
    pub fn with_snapshot_store(cfg: &AppConfig, local: Arc<dyn SnapshotStore>) -> Result<Self> {
        let kind = select_backend(cfg)?;
        let backend: Arc<dyn ProductBackend> = match kind {
            BackendKind::Local => Arc::new(LocalBackend::new(local)),
            BackendKind::Remote => {
                let remote = cfg.remote.clone().context("Missing [remote] section")?;
                Arc::new(RemoteDocumentBackend::new(build_client()?, remote, local))
            }
            BackendKind::Git => {
                let git = cfg.git.clone().context("Missing [git] section")?;
                Arc::new(GitFileBackend::new(build_client()?, git, local))
            }
            BackendKind::Realtime => {
                let realtime = cfg.realtime.clone().context("Missing [realtime] section")?;
                let store = Arc::new(FirestoreDocumentStore::new(build_client()?, realtime));
                Arc::new(RealtimeBackend::new(store, local))
            }
        };
        info!(backend = kind.as_str(), "catalog backend selected");
        Ok(Self::new(kind, backend))
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Timings of every backend call made so far.
    pub fn perf_report(&self) -> PerfReport {
        self.report
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub async fn load(&self) -> Result<Vec<ProductRecord>> {
        self.backend.fetch_all().await
    }

    pub async fn replace_all(&self, records: &[ProductRecord]) -> SaveOutcome {
        self.backend.replace_all(records).await
    }

    /// Append one record. Identifier uniqueness is the caller's concern.
    pub async fn add(&self, record: ProductRecord) -> SaveOutcome {
        let mut records = match self.backend.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(product = %record.id, error = %format!("{e:#}"), "add aborted: fetch failed");
                return SaveOutcome::Failed;
            }
        };
        records.push(record);
        self.backend.replace_all(&records).await
    }

    pub async fn delete(&self, id: &ProductId) -> SaveOutcome {
        self.backend.delete_one(id).await
    }

    pub async fn clear(&self) -> SaveOutcome {
        self.backend.delete_all().await
    }

    /// Push feed of full snapshots; `None` unless the backend pushes.
    pub fn subscribe(&self) -> Option<Subscription> {
        self.backend.subscribe()
    }

    /// Write the collection as pretty JSON to `dir/catalog-products-export.json`.
    pub async fn export_to_file(&self, dir: &Path) -> Result<PathBuf> {
        self.require_local("export")?;
        let records = self.load().await?;
        let text = serde_json::to_string_pretty(&records).context("Failed to encode products")?;

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;
        let path = dir.join(EXPORT_FILE_NAME);
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("Failed to write export: {}", path.display()))?;

        info!(products = records.len(), path = %path.display(), "catalog exported");
        Ok(path)
    }

    /// Replace the collection with the JSON array in `path`.
    ///
    /// Elements are not validated beyond being objects; anything else is
    /// skipped with a warning.
    pub async fn import_from_file(&self, path: &Path) -> Result<ImportOutcome> {
        self.require_local("import")?;
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read import file: {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Import file is not valid JSON: {}", path.display()))?;

        let Value::Array(items) = value else {
            warn!(path = %path.display(), "import file does not hold an array, nothing imported");
            return Ok(ImportOutcome::NotAnArray);
        };
        let records = records_from_values(items);

        let outcome = self.replace_all(&records).await;
        if !outcome.is_success() {
            return Ok(ImportOutcome::NotSaved(outcome));
        }
        info!(products = records.len(), path = %path.display(), "catalog imported");
        Ok(ImportOutcome::Replaced {
            count: records.len(),
        })
    }

    fn require_local(&self, operation: &str) -> Result<()> {
        if self.kind != BackendKind::Local {
            bail!(
                "{operation} is only available with the local backend (active: {})",
                self.kind
            );
        }
        Ok(())
    }
}

fn records_from_values(items: Vec<Value>) -> Vec<ProductRecord> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if !item.is_object() {
                warn!(index, "skipping import element that is not an object");
                return None;
            }
            match ProductRecord::from_value(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable import element");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::MemorySnapshotStore;
    use crate::infrastructure::backends::test_support::unreachable;
    use crate::infrastructure::config::RemoteConfig;
    use crate::infrastructure::memory_documents::MemoryDocumentStore;
    use serde_json::json;

    fn local_repo(records: &[ProductRecord]) -> (Arc<MemorySnapshotStore>, ProductRepository) {
        let store = Arc::new(MemorySnapshotStore::with_records(records));
        let repo = ProductRepository::new(
            BackendKind::Local,
            Arc::new(LocalBackend::new(store.clone())),
        );
        (store, repo)
    }

    fn realtime(project_id: &str, api_key: &str) -> RealtimeConfig {
        RealtimeConfig {
            api_url: "https://firestore.googleapis.com/v1".into(),
            project_id: project_id.into(),
            api_key: api_key.into(),
            collection: "products".into(),
            poll_interval_secs: 5,
        }
    }

    fn ids(records: &[ProductRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn auto_selects_local_without_usable_descriptor() {
        let mut cfg = AppConfig::default();
        assert_eq!(select_backend(&cfg).unwrap(), BackendKind::Local);

        cfg.realtime = Some(realtime("your-project-id", "your-api-key"));
        assert_eq!(select_backend(&cfg).unwrap(), BackendKind::Local);

        cfg.realtime = Some(realtime("shop-prod", "AIzaSyD-real"));
        assert_eq!(select_backend(&cfg).unwrap(), BackendKind::Realtime);
    }

    #[test]
    fn explicit_choice_needs_its_section() {
        let mut cfg = AppConfig {
            backend: BackendChoice::Git,
            ..AppConfig::default()
        };
        assert!(select_backend(&cfg).is_err());

        cfg.backend = BackendChoice::Realtime;
        cfg.realtime = Some(realtime("<project>", "key"));
        assert!(select_backend(&cfg).is_err());

        cfg.backend = BackendChoice::Local;
        assert_eq!(select_backend(&cfg).unwrap(), BackendKind::Local);
    }

    #[tokio::test]
    async fn from_config_builds_the_selected_backend() {
        let mut cfg = AppConfig {
            backend: BackendChoice::Remote,
            ..AppConfig::default()
        };
        cfg.remote = Some(RemoteConfig {
            api_url: unreachable().await,
            bin_id: "bin".into(),
            master_key: "key".into(),
        });
        let store = Arc::new(MemorySnapshotStore::with_records(&[ProductRecord::new("A")]));
        let repo = ProductRepository::with_snapshot_store(&cfg, store).unwrap();

        assert_eq!(repo.kind(), BackendKind::Remote);
        // Unreachable remote: the local snapshot answers.
        assert_eq!(ids(&repo.load().await.unwrap()), ["A"]);
        assert!(repo.export_to_file(Path::new(".")).await.is_err());
    }

    #[tokio::test]
    async fn add_appends_and_delete_removes() {
        let (store, repo) = local_repo(&[ProductRecord::new("A")]);

        assert!(repo.add(ProductRecord::new("B")).await.is_success());
        assert_eq!(ids(&repo.load().await.unwrap()), ["A", "B"]);

        assert!(repo.delete(&ProductId::from("A")).await.is_success());
        assert!(repo.delete(&ProductId::from("nope")).await.is_success());
        assert_eq!(ids(&repo.load().await.unwrap()), ["B"]);

        assert!(repo.clear().await.is_success());
        assert!(repo.load().await.unwrap().is_empty());
        assert_eq!(store.save_count(), 4);
        assert!(repo.subscribe().is_none());
    }

    #[tokio::test]
    async fn perf_report_sees_every_call() {
        let (_, repo) = local_repo(&[]);
        repo.load().await.unwrap();
        repo.clear().await;
        assert_eq!(repo.perf_report().timings.len(), 2);
    }

    #[tokio::test]
    async fn export_then_import_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let lamp: ProductRecord = serde_json::from_value(json!({
            "ProductId": "1005",
            "Product Desc": "Lamp",
            "Origin Price": 20,
            "Discount Price": "15.50",
            "Shop": "north"
        }))
        .unwrap();
        let products = vec![lamp, ProductRecord::new("1006")];
        let (_, repo) = local_repo(&products);

        let path = repo.export_to_file(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join(EXPORT_FILE_NAME));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {"), "export is pretty printed");

        let (_, other) = local_repo(&[ProductRecord::new("old")]);
        let outcome = other.import_from_file(&path).await.unwrap();
        assert_eq!(outcome, ImportOutcome::Replaced { count: 2 });
        assert_eq!(other.load().await.unwrap(), products);
    }

    #[tokio::test]
    async fn import_of_non_array_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.json");
        std::fs::write(&path, r#"{"ProductId": "X"}"#).unwrap();
        let (store, repo) = local_repo(&[ProductRecord::new("A")]);

        assert_eq!(repo.import_from_file(&path).await.unwrap(), ImportOutcome::NotAnArray);
        assert_eq!(ids(&repo.load().await.unwrap()), ["A"]);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn import_of_malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[{").unwrap();
        let (_, repo) = local_repo(&[ProductRecord::new("A")]);

        assert!(repo.import_from_file(&path).await.is_err());
        assert_eq!(ids(&repo.load().await.unwrap()), ["A"]);
    }

    #[tokio::test]
    async fn import_skips_non_objects_and_reports_failed_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.json");
        std::fs::write(&path, r#"[{"ProductId": "A"}, 7, "x", {"ProductId": "B"}]"#).unwrap();
        let (store, repo) = local_repo(&[]);

        assert_eq!(
            repo.import_from_file(&path).await.unwrap(),
            ImportOutcome::Replaced { count: 2 }
        );

        store.fail_writes(true);
        assert_eq!(
            repo.import_from_file(&path).await.unwrap(),
            ImportOutcome::NotSaved(SaveOutcome::Failed)
        );
    }

    #[tokio::test]
    async fn export_and_import_are_local_only() {
        let local = Arc::new(MemorySnapshotStore::new());
        let repo = ProductRepository::new(
            BackendKind::Realtime,
            Arc::new(RealtimeBackend::new(Arc::new(MemoryDocumentStore::new()), local)),
        );
        let dir = tempfile::tempdir().unwrap();
        assert!(repo.export_to_file(dir.path()).await.is_err());
        assert!(repo.import_from_file(&dir.path().join("x.json")).await.is_err());
        assert!(repo.subscribe().is_some());
    }
}
