use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::repository::{ImportOutcome, ProductRepository};
use crate::domain::merge::{merge, missing_columns, unknown_columns, without};
use crate::domain::ports::SaveOutcome;
use crate::domain::product::{ProductRecord, RawRecord};
use crate::domain::subscription::Subscription;
use crate::domain::value_objects::ProductId;
use crate::infrastructure::spreadsheet::read_first_sheet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    Loading,
    Ready,
}

/// What observers see: the state plus the collection it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogView {
    pub state: CatalogState,
    pub products: Vec<ProductRecord>,
}

impl Default for CatalogView {
    fn default() -> Self {
        Self {
            state: CatalogState::Loading,
            products: Vec::new(),
        }
    }
}

/// Result of an upload that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The sheet had no data rows.
    Empty,
    /// Required columns absent from the first row.
    MissingColumns(Vec<String>),
    /// Every identifier was already in the catalog. Nothing was written.
    NoNewProducts,
    Added { count: usize },
}

// ─── CatalogController ───────────────────────────────────────────────────────

/// Owns the in-memory catalog and keeps it in step with the repository.
///
/// Mutations are write-through: the repository is called first and the
/// in-memory collection only changes when it reports success. With a
/// backend that pushes snapshots, the subscription alone drives the
/// collection and mutations merely report the backend's outcome.
pub struct CatalogController {
    repo: Arc<ProductRepository>,
    view: Arc<watch::Sender<CatalogView>>,
    push_driven: AtomicBool,
    shutdown: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl CatalogController {
    pub fn new(repo: Arc<ProductRepository>) -> Self {
        let (view, _) = watch::channel(CatalogView::default());
        Self {
            repo,
            view: Arc::new(view),
            push_driven: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            listener: Mutex::new(None),
        }
    }

    pub fn repository(&self) -> &ProductRepository {
        &self.repo
    }

    /// Observe every change of state or collection.
    pub fn watch(&self) -> watch::Receiver<CatalogView> {
        self.view.subscribe()
    }

    pub fn products(&self) -> Vec<ProductRecord> {
        self.view.borrow().products.clone()
    }

    pub fn state(&self) -> CatalogState {
        self.view.borrow().state
    }

    /// Initial load. Ends in `Ready` whether or not the load worked.
    pub async fn start(&self) {
        match self.repo.subscribe() {
            Some(subscription) => self.follow(subscription).await,
            None => {
                let products = match self.repo.load().await {
                    Ok(products) => products,
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "initial load failed, starting empty");
                        Vec::new()
                    }
                };
                publish(&self.view, products);
            }
        }
        info!(products = self.view.borrow().products.len(), "catalog ready");
    }

    /// Wait for the first delivery, then keep forwarding in the background.
    async fn follow(&self, mut subscription: Subscription) {
        self.push_driven.store(true, Ordering::SeqCst);
        let first = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            first = subscription.recv() => first,
        };
        match first {
            Some(products) => publish(&self.view, products),
            None => {
                warn!("subscription ended before its first delivery");
                publish(&self.view, Vec::new());
                return;
            }
        }

        let view = Arc::clone(&self.view);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = subscription.recv() => match next {
                        Some(products) => {
                            debug!(products = products.len(), "snapshot delivered");
                            publish(&view, products);
                        }
                        None => {
                            warn!("realtime subscription ended");
                            break;
                        }
                    },
                }
            }
            subscription.unsubscribe();
        });
        if let Ok(mut listener) = self.listener.lock() {
            *listener = Some(handle);
        }
    }

    /// Stop following the backend. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.listener.lock().ok().and_then(|mut l| l.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "subscription task did not stop cleanly");
            }
        }
    }

    fn push_driven(&self) -> bool {
        self.push_driven.load(Ordering::SeqCst)
    }

    /// Apply `products` locally if `outcome` succeeded, otherwise fail.
    fn commit(&self, operation: &str, outcome: SaveOutcome, products: Vec<ProductRecord>) -> Result<()> {
        if !outcome.is_success() {
            bail!("{operation} was not saved ({outcome:?})");
        }
        if !self.push_driven() {
            publish(&self.view, products);
        }
        Ok(())
    }

    pub async fn replace_all(&self, products: Vec<ProductRecord>) -> Result<()> {
        let outcome = self.repo.replace_all(&products).await;
        self.commit("replace", outcome, products)
    }

    /// Add one product. `false` when its identifier is already listed.
    pub async fn add(&self, product: ProductRecord) -> Result<bool> {
        let mut products = self.products();
        if products.iter().any(|p| p.id == product.id) {
            return Ok(false);
        }
        let outcome = self.repo.add(product.clone()).await;
        products.push(product);
        self.commit("add", outcome, products)?;
        Ok(true)
    }

    pub async fn delete(&self, id: &ProductId) -> Result<()> {
        let outcome = self.repo.delete(id).await;
        self.commit("delete", outcome, without(self.products(), id))
    }

    pub async fn clear(&self) -> Result<()> {
        let outcome = self.repo.clear().await;
        self.commit("clear", outcome, Vec::new())
    }

    pub async fn export(&self, dir: &Path) -> Result<PathBuf> {
        self.repo.export_to_file(dir).await
    }

    /// Replace the catalog with an exported file, then reload it.
    pub async fn import(&self, path: &Path) -> Result<ImportOutcome> {
        let outcome = self.repo.import_from_file(path).await?;
        match outcome {
            ImportOutcome::Replaced { .. } => {
                let products = self.repo.load().await?;
                publish(&self.view, products);
            }
            ImportOutcome::NotSaved(save) => bail!("import was not saved ({save:?})"),
            ImportOutcome::NotAnArray => {}
        }
        Ok(outcome)
    }

    /// Merge parsed spreadsheet rows into the catalog.
    pub async fn upload(&self, rows: Vec<RawRecord>) -> Result<UploadOutcome> {
        if rows.is_empty() {
            return Ok(UploadOutcome::Empty);
        }
        let missing = missing_columns(&rows);
        if !missing.is_empty() {
            warn!(missing = ?missing, "upload rejected");
            return Ok(UploadOutcome::MissingColumns(missing));
        }
        let unknown = unknown_columns(&rows);
        if !unknown.is_empty() {
            info!(columns = ?unknown, "unrecognised columns kept as extra fields");
        }

        let incoming = rows
            .into_iter()
            .map(ProductRecord::from_raw)
            .collect::<Result<Vec<_>, _>>()
            .context("Uploaded rows are not valid products")?;
        let received = incoming.len();

        let merged = merge(&self.products(), incoming);
        if merged.added == 0 {
            info!(received, "upload held no new products");
            return Ok(UploadOutcome::NoNewProducts);
        }

        self.replace_all(merged.merged).await?;
        info!(received, added = merged.added, "upload merged");
        Ok(UploadOutcome::Added {
            count: merged.added,
        })
    }

    /// Read the first sheet of a workbook and upload it.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadOutcome> {
        let owned = path.to_path_buf();
        let rows = tokio::task::spawn_blocking(move || read_first_sheet(&owned))
            .await
            .context("Spreadsheet reader stopped unexpectedly")??;
        self.upload(rows).await
    }
}

impl Drop for CatalogController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn publish(view: &watch::Sender<CatalogView>, products: Vec<ProductRecord>) {
    view.send_replace(CatalogView {
        state: CatalogState::Ready,
        products,
    });
}
