use crate::domain::ports::{ProductBackend, SaveOutcome};
use crate::domain::{product::ProductRecord, subscription::Subscription, value_objects::ProductId};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, instrument, warn};

// ─── PerfReport ──────────────────────────────────────────────────────────────

/// A single timed backend call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpTiming {
    /// "fetch_all", "replace_all", "delete_one" or "delete_all".
    pub operation: &'static str,
    /// Backend label, see [`ProductBackend::name`].
    pub backend: &'static str,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: u128,
    /// Products read or written.
    pub products: usize,
    pub success: bool,
}

/// Accumulated timings for every backend call made through one repository.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
    pub total_ms: u128,
    pub failures: usize,
}

impl PerfReport {
    pub fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    fn record(report: &Arc<Mutex<Self>>, timing: OpTiming) {
        if let Ok(mut r) = report.lock() {
            r.total_ms += timing.duration_ms;
            if !timing.success {
                r.failures += 1;
            }
            r.timings.push(timing);
        }
    }
}

// ─── MonitoringBackend ───────────────────────────────────────────────────────

/// Decorator: wraps any `ProductBackend`, measures wall time per call, logs
/// it, and appends the result to the shared `PerfReport`.
pub struct MonitoringBackend {
    inner: Arc<dyn ProductBackend>,
    report: Arc<Mutex<PerfReport>>,
}

impl MonitoringBackend {
    pub fn new(inner: Arc<dyn ProductBackend>, report: Arc<Mutex<PerfReport>>) -> Self {
        Self { inner, report }
    }

    fn finish(&self, operation: &'static str, start: Instant, products: usize, success: bool) {
        let duration_ms = start.elapsed().as_millis();
        let backend = self.inner.name();
        if success {
            info!(backend, products, duration_ms, "{operation} completed");
        } else {
            warn!(backend, products, duration_ms, "{operation} did not persist");
        }
        PerfReport::record(
            &self.report,
            OpTiming {
                operation,
                backend,
                duration_ms,
                products,
                success,
            },
        );
    }
}

#[async_trait]
impl ProductBackend for MonitoringBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    #[instrument(name = "fetch_all", skip(self), fields(backend = self.inner.name()), level = "info")]
    async fn fetch_all(&self) -> Result<Vec<ProductRecord>> {
        let start = Instant::now();
        let result = self.inner.fetch_all().await;
        let products = result.as_ref().map(Vec::len).unwrap_or(0);
        self.finish("fetch_all", start, products, result.is_ok());
        result
    }

    #[instrument(
        name = "replace_all",
        skip(self, records),
        fields(backend = self.inner.name(), products = records.len()),
        level = "info"
    )]
    async fn replace_all(&self, records: &[ProductRecord]) -> SaveOutcome {
        let start = Instant::now();
        let outcome = self.inner.replace_all(records).await;
        self.finish("replace_all", start, records.len(), outcome.is_success());
        outcome
    }

    #[instrument(name = "delete_one", skip(self), fields(backend = self.inner.name()), level = "info")]
    async fn delete_one(&self, id: &ProductId) -> SaveOutcome {
        let start = Instant::now();
        let outcome = self.inner.delete_one(id).await;
        self.finish("delete_one", start, 1, outcome.is_success());
        outcome
    }

    #[instrument(name = "delete_all", skip(self), fields(backend = self.inner.name()), level = "info")]
    async fn delete_all(&self) -> SaveOutcome {
        let start = Instant::now();
        let outcome = self.inner.delete_all().await;
        self.finish("delete_all", start, 0, outcome.is_success());
        outcome
    }

    fn subscribe(&self) -> Option<Subscription> {
        self.inner.subscribe()
    }
}
