use anyhow::Result;
use std::sync::Arc;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of storefront's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                              |
/// |---------|-----------------|------------------------------------------|
/// | `Error` | `error`         | `--quiet` / scripting                    |
/// | `Info`  | `info`          | Default, shows per-call backend timings  |
/// | `Debug` | `debug`         | `--verbose`, shows every snapshot poll   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for storefront.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise.
/// Call this once at start-up. Library consumers who manage their own
/// subscriber should skip it.
///
/// Only available with the `cli` feature (pulls in `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "storefront=error",
        LogLevel::Info  => "storefront=info",
        LogLevel::Debug => "storefront=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::controller::{CatalogController, CatalogState, CatalogView, UploadOutcome};
pub use application::monitoring::{OpTiming, PerfReport};
pub use application::repository::{BackendKind, ImportOutcome, ProductRepository, EXPORT_FILE_NAME};
pub use domain::fingerprint::fingerprint;
pub use domain::ports::{DocumentStore, ProductBackend, SaveOutcome, SnapshotStore};
pub use domain::product::{ProductRecord, RawRecord, Scalar, OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
pub use domain::subscription::Subscription;
pub use domain::value_objects::{Fingerprint, ProductId, StorageKey};
pub use infrastructure::config::{AppConfig, BackendChoice};
pub use presentation::card::CardView;

// ─── Public entry points ───

/// Build the repository named by `cfg` and a started controller over it.
///
/// The controller is `Ready` on return: the initial load (or first
/// realtime delivery) has completed, successfully or not.
pub async fn open(cfg: &AppConfig) -> Result<CatalogController> {
    let repo = Arc::new(ProductRepository::from_config(cfg)?);
    let controller = CatalogController::new(repo);
    controller.start().await;
    Ok(controller)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_defaults_to_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.storage.dir = dir.path().to_path_buf();

        let catalog = open(&cfg).await.unwrap();
        assert_eq!(catalog.repository().kind(), BackendKind::Local);
        assert_eq!(catalog.state(), CatalogState::Ready);

        catalog.add(ProductRecord::new("A")).await.unwrap();
        assert!(dir.path().join("catalog-products.json").exists());

        let reopened = open(&cfg).await.unwrap();
        assert_eq!(reopened.products(), vec![ProductRecord::new("A")]);
    }
}
