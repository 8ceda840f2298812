//! Trait definitions for the collaborators a run calls into.
//!
//! The orchestrators never talk to the network themselves. Importing a
//! remote product and generating embeddings are supplied by the caller
//! through these traits, which enables:
//!
//! - **Testability**: mock collaborators with controlled latency and failures
//! - **Flexibility**: different backends (HTTP API, in-process model server)
//!
//! # Example
//!
//! ```
//! use foodflow_core::traits::ProductImporter;
//! use foodflow_core::{AppError, Product};
//!
//! async fn import_all<I: ProductImporter>(
//!     importer: &I,
//!     codes: &[String],
//! ) -> Vec<Result<Product, AppError>> {
//!     let mut out = Vec::new();
//!     for code in codes {
//!         out.push(importer.import_product(code).await);
//!     }
//!     out
//! }
//! ```

use std::future::Future;

use crate::AppError;
use crate::models::{BatchEmbeddingResult, Product};

/// Imports a single product from the remote food database into the store.
pub trait ProductImporter: Send + Sync {
    /// Looks up `code` remotely, upserts it into the store and returns the
    /// authoritative record.
    ///
    /// # Errors
    ///
    /// Network failures, non-success statuses and unknown barcodes
    /// (`AppError::NotFound`).
    fn import_product(&self, code: &str) -> impl Future<Output = Result<Product, AppError>> + Send;
}

/// Generates embeddings for stored products in bulk.
pub trait EmbeddingBackend: Send + Sync {
    /// Requests embeddings for every product id in `ids`.
    ///
    /// With `force`, products that already have embeddings are regenerated.
    /// The result may cover only part of `ids`; a failure covers the whole
    /// request.
    fn generate_batch(
        &self,
        ids: &[String],
        force: bool,
    ) -> impl Future<Output = Result<BatchEmbeddingResult, AppError>> + Send;

    /// Largest number of ids the backend accepts per request.
    fn max_batch_size(&self) -> usize {
        usize::MAX
    }
}
