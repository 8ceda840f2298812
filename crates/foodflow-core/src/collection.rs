//! The caller's working set of products and its selection.
//!
//! Merges performed here are provisional display state: the backend store is
//! the source of truth and callers reload from it after a sync run.

use std::collections::HashSet;

use crate::models::{Product, ProductEmbeddings};

/// How a canonical record was merged into a [`ProductCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// An existing product with the same code was updated at this position.
    Replaced(usize),
    /// No product had this code; the record was inserted at the front.
    Inserted,
}

/// Ordered collection of products, keyed by `id` and by `code`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductCollection {
    products: Vec<Product>,
}

impl ProductCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Product> {
        self.products.iter()
    }

    pub fn as_slice(&self) -> &[Product] {
        &self.products
    }

    pub fn into_inner(self) -> Vec<Product> {
        self.products
    }

    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn find_by_code(&self, code: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.code == code)
    }

    /// Replaces the whole collection, e.g. after reloading from the backend.
    pub fn replace_all(&mut self, products: Vec<Product>) {
        self.products = products;
    }

    /// Merges an imported canonical record by natural key.
    ///
    /// If a product with the same `code` exists, its fields are replaced in
    /// place and it stops being remote-only; cached embeddings survive when
    /// the canonical record carries none. Otherwise the record is inserted at
    /// the front.
    pub fn merge_canonical(&mut self, canonical: Product) -> MergeOutcome {
        match self.products.iter().position(|p| p.code == canonical.code) {
            Some(index) => {
                let existing = &mut self.products[index];
                let embeddings = canonical.embeddings.or_else(|| existing.embeddings.take());
                *existing = Product {
                    remote: false,
                    embeddings,
                    ..canonical
                };
                MergeOutcome::Replaced(index)
            }
            None => {
                self.products.insert(
                    0,
                    Product {
                        remote: false,
                        ..canonical
                    },
                );
                MergeOutcome::Inserted
            }
        }
    }

    /// Attaches freshly generated embeddings to the product with `id`.
    ///
    /// Returns false (and changes nothing) if no product has that id.
    pub fn apply_embeddings(&mut self, id: &str, embeddings: ProductEmbeddings) -> bool {
        match self.products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.embeddings = Some(embeddings);
                true
            }
            None => false,
        }
    }
}

impl From<Vec<Product>> for ProductCollection {
    fn from(products: Vec<Product>) -> Self {
        Self { products }
    }
}

impl<'a> IntoIterator for &'a ProductCollection {
    type Item = &'a Product;
    type IntoIter = std::slice::Iter<'a, Product>;

    fn into_iter(self) -> Self::IntoIter {
        self.products.iter()
    }
}

/// Ordered, duplicate-free set of product ids chosen for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id`, returning false if it was already selected.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if !self.seen.insert(id.clone()) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Removes `id`, returning false if it was not selected.
    pub fn remove(&mut self, id: &str) -> bool {
        if !self.seen.remove(id) {
            return false;
        }
        self.ids.retain(|selected| selected != id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.seen.clear();
    }
}

impl<S: Into<String>> FromIterator<S> for Selection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut selection = Selection::new();
        for id in iter {
            selection.insert(id);
        }
        selection
    }
}
