//! Sync orchestrator: imports selected remote-only products.
//!
//! For every selected product that only exists in the remote food database,
//! the [`SyncService`] asks its [`ProductImporter`] to import it by barcode,
//! with at most `SyncConfig::concurrency` imports in flight. Each imported
//! canonical record is merged into the caller's [`ProductCollection`] by
//! barcode; failed imports leave their product untouched (still remote-only).
//!
//! Failures are counted, never retried within a run, and never stop other
//! imports. Progress is recorded as each import completes.
//!
//! # Example
//!
//! ```ignore
//! use foodflow_core::{ProgressTracker, SyncService, TracingReporter};
//!
//! let service = SyncService::new(client);
//! let tracker = ProgressTracker::new();
//! let summary = service
//!     .sync_selected(&mut products, &mut selection, &tracker, &TracingReporter)
//!     .await?;
//! println!("{}", summary.message());
//! ```

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::collection::{ProductCollection, Selection};
use crate::config::SyncConfig;
use crate::error::AppError;
use crate::pool::run_bounded_with;
use crate::progress::{ProgressReporter, ProgressTracker, RunEvent, RunKind, SilentReporter};
use crate::traits::ProductImporter;

/// Result of a sync run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Products imported and merged.
    pub synced: usize,
    /// Products whose import failed (or never ran because of cancellation).
    pub failed: usize,
    /// True if the run was cancelled before every import was attempted.
    pub cancelled: bool,
}

impl SyncSummary {
    pub fn total(&self) -> usize {
        self.synced + self.failed
    }

    /// One-line end-of-run notification.
    pub fn message(&self) -> String {
        let mut msg = format!("Synced {} product(s)", self.synced);
        if self.failed > 0 {
            msg.push_str(&format!(", {} failed", self.failed));
        }
        if self.cancelled {
            msg.push_str(" (cancelled)");
        }
        msg
    }
}

/// Service importing selected remote-only products.
///
/// # Type Parameters
///
/// * `I` - Importer implementation (e.g., the HTTP backend client)
pub struct SyncService<I: ProductImporter> {
    importer: I,
    config: SyncConfig,
}

impl<I> Clone for SyncService<I>
where
    I: ProductImporter + Clone,
{
    fn clone(&self) -> Self {
        Self {
            importer: self.importer.clone(),
            config: self.config.clone(),
        }
    }
}

impl<I: ProductImporter> SyncService<I> {
    /// Creates a sync service with default configuration.
    pub fn new(importer: I) -> Self {
        Self {
            importer,
            config: SyncConfig::default(),
        }
    }

    /// Creates a sync service with custom configuration.
    pub fn with_config(importer: I, config: SyncConfig) -> Self {
        Self { importer, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Imports every selected remote-only product and merges the results.
    ///
    /// Selected ids that are unknown or already local are ignored. With
    /// nothing to import the call returns an empty summary without touching
    /// the tracker, the collection or the selection. Otherwise, once every
    /// import has an outcome, the selection is cleared and
    /// [`RunEvent::RefreshRequested`] is emitted: merged records are
    /// provisional and the caller should reload from the backend.
    ///
    /// # Errors
    ///
    /// Only [`AppError::RunInProgress`] if `tracker` already has an active
    /// run. Import failures are counted in the summary.
    pub async fn sync_selected<R: ProgressReporter>(
        &self,
        collection: &mut ProductCollection,
        selection: &mut Selection,
        tracker: &ProgressTracker,
        reporter: &R,
    ) -> Result<SyncSummary, AppError> {
        self.sync_selected_cancellable(
            collection,
            selection,
            tracker,
            reporter,
            CancellationToken::new(), // never cancelled
        )
        .await
    }

    /// Same as [`sync_selected`](Self::sync_selected) without progress events.
    pub async fn sync_selected_silent(
        &self,
        collection: &mut ProductCollection,
        selection: &mut Selection,
        tracker: &ProgressTracker,
    ) -> Result<SyncSummary, AppError> {
        self.sync_selected(collection, selection, tracker, &SilentReporter)
            .await
    }

    /// Same as [`sync_selected`](Self::sync_selected), with cancellation.
    ///
    /// On cancellation no new imports start, in-flight imports complete and
    /// are merged, and imports never started are counted as failed.
    pub async fn sync_selected_cancellable<R: ProgressReporter>(
        &self,
        collection: &mut ProductCollection,
        selection: &mut Selection,
        tracker: &ProgressTracker,
        reporter: &R,
        cancel_token: CancellationToken,
    ) -> Result<SyncSummary, AppError> {
        let codes = remote_codes(collection, selection);
        if codes.is_empty() {
            tracing::info!(
                selected = selection.len(),
                "No remote products selected to sync"
            );
            return Ok(SyncSummary::default());
        }

        let total = codes.len();
        let run = tracker.start(total)?;
        reporter.report(RunEvent::RunStarted {
            kind: RunKind::Sync,
            total,
        });

        let outcomes = run_bounded_with(
            codes.clone(),
            self.config.concurrency,
            &cancel_token,
            |code| async move { self.importer.import_product(&code).await },
            |index, outcome| {
                let progress = match outcome {
                    Ok(_) => run.record_success(1),
                    Err(e) => {
                        tracing::warn!(code = %codes[index], error = %e, "Product import failed");
                        run.record_failure(1)
                    }
                };
                reporter.report(RunEvent::UnitCompleted {
                    kind: RunKind::Sync,
                    index,
                    size: 1,
                    error: outcome.as_ref().err(),
                    progress,
                });
            },
        )
        .await;

        let mut summary = SyncSummary::default();
        for (code, outcome) in codes.iter().zip(outcomes) {
            match outcome {
                Ok(product) => {
                    if product.code != *code {
                        tracing::warn!(
                            requested = %code,
                            returned = %product.code,
                            "Imported product has a different barcode"
                        );
                    }
                    collection.merge_canonical(product);
                    summary.synced += 1;
                }
                Err(AppError::Cancelled) => {
                    summary.failed += 1;
                    summary.cancelled = true;
                }
                Err(_) => summary.failed += 1,
            }
        }

        let progress = run.finish();
        selection.clear();

        reporter.report(RunEvent::RunFinished {
            kind: RunKind::Sync,
            progress,
            cancelled: summary.cancelled,
        });
        reporter.report(RunEvent::RefreshRequested);

        Ok(summary)
    }
}

/// Barcodes of the selected products that are remote-only, in selection
/// order, each at most once.
fn remote_codes(collection: &ProductCollection, selection: &Selection) -> Vec<String> {
    let mut seen = HashSet::new();
    selection
        .ids()
        .iter()
        .filter_map(|id| collection.get(id))
        .filter(|p| p.remote)
        .filter(|p| seen.insert(p.code.as_str()))
        .map(|p| p.code.clone())
        .collect()
}
