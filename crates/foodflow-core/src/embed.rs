//! Embedding orchestrator: bulk embedding generation in bounded batches.
//!
//! Keys that already have embeddings are skipped (unless forced), the rest
//! are chunked into batches of at most `batch_size` and the batches are sent
//! to the [`EmbeddingBackend`] with at most `concurrency` requests in flight.
//!
//! Progress is counted in products, not batches. When a batch is only
//! partially served, the products the backend returned count as done and the
//! remaining members of that batch count as failed, so `done + failed` always
//! reaches `total`. Products the backend reports as already embedded count as
//! done and end up in the skipped total.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::batch::chunk;
use crate::collection::{ProductCollection, Selection};
use crate::config::SyncConfig;
use crate::error::AppError;
use crate::models::{BatchEmbeddingResult, EmbeddedProduct};
use crate::pool::run_bounded_with;
use crate::progress::{ProgressReporter, ProgressTracker, RunEvent, RunKind};
use crate::traits::EmbeddingBackend;

/// Result of an embedding run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedSummary {
    /// Products the backend returned embeddings for.
    pub embedded: usize,
    /// Selected products left out of the run (already embedded, remote-only
    /// or unknown), including those the backend reported as already embedded.
    pub skipped: usize,
    /// Products sent in a batch that failed or did not cover them.
    pub failed: usize,
    /// True if the run was cancelled before every batch was sent.
    pub cancelled: bool,
}

impl EmbedSummary {
    /// One-line end-of-run notification.
    pub fn message(&self) -> String {
        let mut msg = format!(
            "Embeddings generated for {} product(s), {} skipped",
            self.embedded, self.skipped
        );
        if self.failed > 0 {
            msg.push_str(&format!(", {} failed", self.failed));
        }
        if self.cancelled {
            msg.push_str(" (cancelled)");
        }
        msg
    }
}

/// Parameters of one [`embed_keys`] call.
#[derive(Debug, Clone, Copy)]
pub struct EmbedOptions {
    /// Maximum keys per backend request.
    pub batch_size: usize,
    /// Maximum backend requests in flight.
    pub concurrency: usize,
    /// Regenerate embeddings the backend already has.
    pub force: bool,
}

/// Output of [`embed_keys`].
#[derive(Debug, Default)]
pub struct EmbedRun {
    pub summary: EmbedSummary,
    /// Embeddings returned by the backend, restricted to keys that were
    /// actually requested, in batch order.
    pub results: Vec<EmbeddedProduct>,
}

/// Generates embeddings for `keys` in bounded batches.
///
/// `is_already_embedded` decides which keys are skipped; skipped keys are
/// reported once through [`RunEvent::SelectionSkipped`] and never reach the
/// backend. Duplicate keys are sent once and the extra copies count as
/// skipped. If nothing is left to embed, the tracker is never started.
///
/// # Errors
///
/// Only [`AppError::RunInProgress`] if `tracker` already has an active run.
/// Backend failures are counted in the summary.
pub async fn embed_keys<B, K, R>(
    backend: &B,
    keys: &[String],
    is_already_embedded: K,
    options: EmbedOptions,
    tracker: &ProgressTracker,
    reporter: &R,
    cancel_token: &CancellationToken,
) -> Result<EmbedRun, AppError>
where
    B: EmbeddingBackend,
    K: Fn(&str) -> bool,
    R: ProgressReporter,
{
    let mut seen = HashSet::new();
    let embeddable: Vec<String> = keys
        .iter()
        .filter(|key| !is_already_embedded(key.as_str()))
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect();

    let skipped = keys.len() - embeddable.len();
    if skipped > 0 {
        reporter.report(RunEvent::SelectionSkipped {
            kind: RunKind::Embedding,
            count: skipped,
        });
    }

    if embeddable.is_empty() {
        tracing::info!(selected = keys.len(), "Nothing to embed");
        return Ok(EmbedRun {
            summary: EmbedSummary {
                skipped,
                ..Default::default()
            },
            results: Vec::new(),
        });
    }

    let total = embeddable.len();
    let batches = chunk(&embeddable, options.batch_size);
    let run = tracker.start(total)?;
    reporter.report(RunEvent::RunStarted {
        kind: RunKind::Embedding,
        total,
    });
    tracing::debug!(
        total,
        batches = batches.len(),
        batch_size = options.batch_size,
        "Embedding batches prepared"
    );

    let force = options.force;
    let outcomes = run_bounded_with(
        batches.clone(),
        options.concurrency,
        cancel_token,
        |batch| async move { backend.generate_batch(&batch, force).await },
        |index, outcome| {
            let batch = &batches[index];
            let mut progress = run.snapshot();
            match outcome {
                Ok(result) => {
                    let covered = covered_keys(batch, result).len();
                    let answered = covered + stored_elsewhere(batch, covered, result);
                    if answered > 0 {
                        progress = run.record_success(answered);
                    }
                    let missing = batch.len() - answered;
                    if missing > 0 {
                        tracing::warn!(
                            batch = index,
                            requested = batch.len(),
                            returned = covered,
                            "Embedding batch partially served"
                        );
                        progress = run.record_failure(missing);
                    }
                }
                Err(e) => {
                    tracing::warn!(batch = index, size = batch.len(), error = %e, "Embedding batch failed");
                    progress = run.record_failure(batch.len());
                }
            }
            reporter.report(RunEvent::UnitCompleted {
                kind: RunKind::Embedding,
                index,
                size: batch.len(),
                error: outcome.as_ref().err(),
                progress,
            });
        },
    )
    .await;

    let mut summary = EmbedSummary {
        skipped,
        ..Default::default()
    };
    let mut results = Vec::new();

    for (batch, outcome) in batches.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                let covered = covered_keys(batch, &result);
                let stored = stored_elsewhere(batch, covered.len(), &result);
                summary.embedded += covered.len();
                summary.skipped += stored;
                summary.failed += batch.len() - covered.len() - stored;

                let mut taken = HashSet::new();
                for item in result.items {
                    if !covered.contains(item.id.as_str()) {
                        tracing::debug!(id = %item.id, "Ignoring embedding for unrequested product");
                        continue;
                    }
                    if taken.insert(item.id.clone()) {
                        results.push(item);
                    }
                }
            }
            Err(AppError::Cancelled) => {
                summary.failed += batch.len();
                summary.cancelled = true;
            }
            Err(_) => summary.failed += batch.len(),
        }
    }

    let progress = run.finish();
    reporter.report(RunEvent::RunFinished {
        kind: RunKind::Embedding,
        progress,
        cancelled: summary.cancelled,
    });

    Ok(EmbedRun { summary, results })
}

/// Distinct keys of `batch` that `result` returned embeddings for.
fn covered_keys<'a>(batch: &'a [String], result: &BatchEmbeddingResult) -> HashSet<&'a str> {
    let returned: HashSet<&str> = result.items.iter().map(|item| item.id.as_str()).collect();
    batch
        .iter()
        .map(String::as_str)
        .filter(|key| returned.contains(key))
        .collect()
}

/// Members of `batch` the backend reported as already embedded, capped by
/// the members it did not return.
fn stored_elsewhere(batch: &[String], covered: usize, result: &BatchEmbeddingResult) -> usize {
    result.already_embedded.min(batch.len() - covered)
}

/// Service generating embeddings for selected local products.
pub struct EmbeddingService<B: EmbeddingBackend> {
    backend: B,
    config: SyncConfig,
}

impl<B> Clone for EmbeddingService<B>
where
    B: EmbeddingBackend + Clone,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B: EmbeddingBackend> EmbeddingService<B> {
    /// Creates an embedding service with default configuration.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: SyncConfig::default(),
        }
    }

    /// Creates an embedding service with custom configuration.
    pub fn with_config(backend: B, config: SyncConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Effective batch size: the configured size capped by the backend limit.
    pub fn batch_size(&self) -> usize {
        self.config
            .embedding_batch_size
            .min(self.backend.max_batch_size())
            .max(1)
    }

    /// Generates embeddings for the selected local products and attaches the
    /// returned vectors to `collection`.
    ///
    /// Selected ids that are unknown, remote-only or already embedded are
    /// skipped (already embedded ones are sent anyway when
    /// `SyncConfig::force_reembed` is set). The selection is left unchanged.
    ///
    /// # Errors
    ///
    /// Only [`AppError::RunInProgress`] if `tracker` already has an active
    /// run.
    pub async fn embed_selected<R: ProgressReporter>(
        &self,
        collection: &mut ProductCollection,
        selection: &Selection,
        tracker: &ProgressTracker,
        reporter: &R,
    ) -> Result<EmbedSummary, AppError> {
        self.embed_selected_cancellable(
            collection,
            selection,
            tracker,
            reporter,
            CancellationToken::new(),
        )
        .await
    }

    /// Same as [`embed_selected`](Self::embed_selected), with cancellation.
    ///
    /// Batches not yet sent when the token fires count as failed.
    pub async fn embed_selected_cancellable<R: ProgressReporter>(
        &self,
        collection: &mut ProductCollection,
        selection: &Selection,
        tracker: &ProgressTracker,
        reporter: &R,
        cancel_token: CancellationToken,
    ) -> Result<EmbedSummary, AppError> {
        let force = self.config.force_reembed;
        let options = EmbedOptions {
            batch_size: self.batch_size(),
            concurrency: self.config.embedding_concurrency,
            force,
        };

        let run = {
            let view: &ProductCollection = collection;
            let is_already_embedded = |id: &str| match view.get(id) {
                None => true,
                Some(product) if product.remote => true,
                Some(product) => !force && product.has_embeddings(),
            };
            embed_keys(
                &self.backend,
                selection.ids(),
                is_already_embedded,
                options,
                tracker,
                reporter,
                &cancel_token,
            )
            .await?
        };

        for item in run.results {
            if !collection.apply_embeddings(&item.id, item.embeddings) {
                tracing::debug!(id = %item.id, "Embedded product no longer in collection");
            }
        }

        Ok(run.summary)
    }
}
