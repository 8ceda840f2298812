//! FoodFlow Client - HTTP client for the inventory backend.
//!
//! [`BackendClient`] talks to the inventory API and implements the
//! collaborator traits of `foodflow-core`:
//!
//! - [`ProductImporter`](foodflow_core::traits::ProductImporter) via
//!   `POST api/products/import`
//! - [`EmbeddingBackend`](foodflow_core::traits::EmbeddingBackend) via
//!   `POST api/embeddings/generate`
//!
//! It also loads the working collection (local page plus remote search
//! results) used by the CLI.

pub mod backend;

pub use backend::{BackendClient, ProductPage};
