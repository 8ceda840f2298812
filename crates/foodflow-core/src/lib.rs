//! FoodFlow Core - bounded-concurrency sync and embedding engine.
//!
//! This crate drives the two bulk operations of the FoodFlow inventory:
//!
//! - **Sync**: import selected remote-only products into the local store,
//!   one request per product, with [`SyncService`]
//! - **Embedding**: generate embeddings for selected local products, in
//!   batches, with [`EmbeddingService`]
//!
//! Both are built on the same pieces:
//!
//! - **Worker pool**: [`run_bounded`] keeps at most N operations in flight and
//!   returns outcomes in input order
//! - **Batching**: [`chunk`] partitions keys into ordered groups
//! - **Progress**: [`ProgressTracker`] counters a UI can poll, plus the
//!   [`ProgressReporter`] trait for decoupled logging
//! - **Traits**: [`ProductImporter`] and [`EmbeddingBackend`] abstract the
//!   network so runs can be tested with mocks
//!
//! # Example
//!
//! ```ignore
//! use foodflow_core::{EmbeddingService, ProgressTracker, SyncService, TracingReporter};
//!
//! let tracker = ProgressTracker::new();
//!
//! let sync = SyncService::new(client.clone());
//! let summary = sync
//!     .sync_selected(&mut products, &mut selection, &tracker, &TracingReporter)
//!     .await?;
//!
//! let embed = EmbeddingService::new(client);
//! let summary = embed
//!     .embed_selected(&mut products, &selection, &tracker, &TracingReporter)
//!     .await?;
//! ```

pub mod batch;
pub mod collection;
pub mod config;
pub mod embed;
pub mod error;
pub mod models;
pub mod pool;
pub mod progress;
pub mod sync;
pub mod traits;

// Batching and the worker pool
pub use batch::chunk;
pub use pool::{Outcome, run_bounded, run_bounded_with};

// Configuration
pub use config::{AppConfig, BackendConfig, SyncConfig, default_config_path, load_config};

// Error handling
pub use error::AppError;

// Domain models
pub use collection::{MergeOutcome, ProductCollection, Selection};
pub use models::{BatchEmbeddingResult, EmbeddedProduct, Product, ProductEmbeddings};

// Progress tracking and reporting
pub use progress::{
    ActiveRun, ProgressReporter, ProgressState, ProgressTracker, RunEvent, RunKind,
    SilentReporter, TracingReporter,
};

// Traits for dependency injection
pub use traits::{EmbeddingBackend, ProductImporter};

// Services (generic over trait implementations)
pub use embed::{EmbedOptions, EmbedRun, EmbedSummary, EmbeddingService, embed_keys};
pub use sync::{SyncService, SyncSummary};
