//! Test utilities and mock implementations for integration tests.
//!
//! Provides mock collaborators for testing `SyncService` and
//! `EmbeddingService` in isolation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use foodflow_core::progress::{ProgressReporter, RunEvent};
use foodflow_core::traits::{EmbeddingBackend, ProductImporter};
use foodflow_core::{AppError, BatchEmbeddingResult, EmbeddedProduct, Product, ProductEmbeddings};
use rand::Rng;
use tokio::time::sleep;

// =============================================================================
// Product fixtures
// =============================================================================

/// A product returned by the remote search, not yet in the store.
pub fn remote_product(code: &str) -> Product {
    serde_json::from_value(serde_json::json!({
        "id": format!("remote:{code}"),
        "code": code,
        "product_name": format!("Remote {code}"),
        "categories": "Snacks, Biscuits",
        "remote": true,
    }))
    .unwrap()
}

/// A stored product without embeddings.
pub fn local_product(id: &str, code: &str) -> Product {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "code": code,
        "product_name": format!("Local {code}"),
    }))
    .unwrap()
}

/// A stored product that already carries embeddings.
pub fn embedded_product(id: &str, code: &str) -> Product {
    let mut product = local_product(id, code);
    product.embeddings = Some(ProductEmbeddings {
        model: "cached-model".to_string(),
        name_desc: vec![0.25; 4],
        updated_at: Some(chrono::Utc::now()),
        ..Default::default()
    });
    product
}

/// Canonical record the store returns when importing `code`.
pub fn canonical_id(code: &str) -> String {
    format!("db-{code}")
}

// =============================================================================
// In-flight accounting
// =============================================================================

/// Tracks how many calls run at once and the highest value observed.
#[derive(Clone, Default)]
pub struct InFlight {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

/// Random latency in `[min_ms, max_ms]`, drawn before any await point.
fn jitter(latency: Option<(u64, u64)>) -> Option<Duration> {
    latency.map(|(min_ms, max_ms)| {
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(min_ms..=max_ms))
    })
}

// =============================================================================
// MockImporter
// =============================================================================

/// Mock importer with configurable failures and latency.
#[derive(Clone, Default)]
pub struct MockImporter {
    failing_codes: Arc<HashSet<String>>,
    failure_rate: f32,
    latency: Option<(u64, u64)>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub failed: Arc<Mutex<Vec<String>>>,
    pub in_flight: InFlight,
}

impl MockImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports of these codes always fail.
    pub fn failing(codes: &[&str]) -> Self {
        Self {
            failing_codes: Arc::new(codes.iter().map(|c| c.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Each import fails with probability `rate`.
    pub fn with_failure_rate(mut self, rate: f32) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Each import sleeps a random time in `[min_ms, max_ms]`.
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency = Some((min_ms, max_ms));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn failed_codes(&self) -> Vec<String> {
        self.failed.lock().unwrap().clone()
    }
}

impl ProductImporter for MockImporter {
    async fn import_product(&self, code: &str) -> Result<Product, AppError> {
        self.calls.lock().unwrap().push(code.to_string());
        let delay = jitter(self.latency);
        let random_failure = self.failure_rate > 0.0 && rand::rng().random::<f32>() < self.failure_rate;

        self.in_flight.enter();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.in_flight.exit();

        if random_failure || self.failing_codes.contains(code) {
            self.failed.lock().unwrap().push(code.to_string());
            return Err(AppError::NotFound(format!("product {code}")));
        }

        let mut product = local_product(&canonical_id(code), code);
        product.product_name = format!("Imported {code}");
        Ok(product)
    }
}

// =============================================================================
// MockEmbeddingBackend
// =============================================================================

/// One recorded `generate_batch` call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCall {
    pub ids: Vec<String>,
    pub force: bool,
}

/// Mock embedding backend recording every batch it receives.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    max_batch_size: usize,
    /// Batches containing any of these ids fail entirely.
    failing_ids: Arc<HashSet<String>>,
    /// These ids are silently left out of successful results.
    omitted_ids: Arc<HashSet<String>>,
    /// These ids are reported as already embedded instead of returned.
    stored_ids: Arc<HashSet<String>>,
    failure_rate: f32,
    latency: Option<(u64, u64)>,
    pub calls: Arc<Mutex<Vec<BatchCall>>>,
    pub in_flight: InFlight,
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self {
            max_batch_size: usize::MAX,
            failing_ids: Arc::default(),
            omitted_ids: Arc::default(),
            stored_ids: Arc::default(),
            failure_rate: 0.0,
            latency: None,
            calls: Arc::default(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn failing_on(mut self, ids: &[&str]) -> Self {
        self.failing_ids = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn omitting(mut self, ids: &[&str]) -> Self {
        self.omitted_ids = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn already_embedded(mut self, ids: &[&str]) -> Self {
        self.stored_ids = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_failure_rate(mut self, rate: f32) -> Self {
        self.failure_rate = rate;
        self
    }

    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency = Some((min_ms, max_ms));
        self
    }

    pub fn recorded_calls(&self) -> Vec<BatchCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Batch sizes sorted ascending (call order depends on scheduling).
    pub fn batch_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.recorded_calls().iter().map(|c| c.ids.len()).collect();
        sizes.sort_unstable();
        sizes
    }
}

impl EmbeddingBackend for MockEmbeddingBackend {
    async fn generate_batch(
        &self,
        ids: &[String],
        force: bool,
    ) -> Result<BatchEmbeddingResult, AppError> {
        self.calls.lock().unwrap().push(BatchCall {
            ids: ids.to_vec(),
            force,
        });
        let delay = jitter(self.latency);
        let random_failure = self.failure_rate > 0.0 && rand::rng().random::<f32>() < self.failure_rate;

        self.in_flight.enter();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.in_flight.exit();

        if random_failure || ids.iter().any(|id| self.failing_ids.contains(id)) {
            return Err(AppError::ClientError("embedding_failed".to_string()));
        }

        let already_embedded = if force {
            0
        } else {
            ids.iter().filter(|id| self.stored_ids.contains(*id)).count()
        };
        let items = ids
            .iter()
            .filter(|id| !self.omitted_ids.contains(*id))
            .filter(|id| force || !self.stored_ids.contains(*id))
            .map(|id| EmbeddedProduct {
                id: id.clone(),
                embeddings: ProductEmbeddings {
                    model: "mock-embedder".to_string(),
                    name_desc: vec![0.5; 4],
                    ingredients: vec![0.1; 4],
                    nutrition: vec![0.9; 4],
                    updated_at: Some(chrono::Utc::now()),
                },
            })
            .collect();

        Ok(BatchEmbeddingResult {
            model: "mock-embedder".to_string(),
            items,
            already_embedded,
        })
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

// =============================================================================
// RecordingReporter
// =============================================================================

/// Reporter that records a compact label for every event.
#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.labels().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: RunEvent<'_>) {
        let label = match event {
            RunEvent::RunStarted { kind, total } => format!("started:{kind}:{total}"),
            RunEvent::SelectionSkipped { kind, count } => format!("skipped:{kind}:{count}"),
            RunEvent::UnitCompleted { error, size, .. } => match error {
                Some(_) => format!("unit:failed:{size}"),
                None => format!("unit:ok:{size}"),
            },
            RunEvent::RunFinished {
                kind, cancelled, ..
            } => format!("finished:{kind}:{cancelled}"),
            RunEvent::RefreshRequested => "refresh".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}
