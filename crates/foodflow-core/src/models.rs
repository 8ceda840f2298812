//! Domain models shared by the orchestrators and the backend client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A product in the caller's working collection.
///
/// Products come from two places: the local store (`remote == false`, `id`
/// is the store key) and the remote food database search
/// (`remote == true`, `id` is `remote:<code>`). `code` (the barcode) is the
/// natural key that ties the two together.
///
/// # Examples
///
/// ```
/// use foodflow_core::Product;
///
/// let json = r#"{
///     "id": "665f1c2a9b1e8a0012345678",
///     "code": "3017620422003",
///     "product_name": "Nutella",
///     "categories": "Spreads, Sweet spreads",
///     "nova_group": 4
/// }"#;
///
/// let product: Product = serde_json::from_str(json).unwrap();
/// assert_eq!(product.categories, vec!["Spreads", "Sweet spreads"]);
/// assert!(!product.remote);
/// assert!(!product.has_embeddings());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub brands: String,
    /// Either a JSON list or the comma-separated string the remote search returns.
    #[serde(default, deserialize_with = "deserialize_categories")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub nutriscore_grade: Option<String>,
    #[serde(default)]
    pub nova_group: Option<u8>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub ingredients_text: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nutriments: Map<String, Value>,
    #[serde(default)]
    pub last_modified: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// True while the product only exists in the remote food database.
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub embeddings: Option<ProductEmbeddings>,
}

impl Product {
    /// Returns true if the product carries a cached embedding.
    pub fn has_embeddings(&self) -> bool {
        self.embeddings
            .as_ref()
            .is_some_and(ProductEmbeddings::is_present)
    }
}

/// Embedding vectors generated for a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductEmbeddings {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub name_desc: Vec<f32>,
    #[serde(default)]
    pub ingredients: Vec<f32>,
    #[serde(default)]
    pub nutrition: Vec<f32>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProductEmbeddings {
    /// A product counts as embedded once it has a generation timestamp or a
    /// non-empty name/description vector.
    pub fn is_present(&self) -> bool {
        self.updated_at.is_some() || !self.name_desc.is_empty()
    }
}

/// Per-product result returned by a bulk embedding request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedProduct {
    pub id: String,
    pub embeddings: ProductEmbeddings,
}

/// Result of one bulk embedding request.
///
/// `items` may cover fewer ids than were requested when the backend only
/// partially served the batch. `already_embedded` counts requested products
/// the backend left alone because it already had their embeddings; it does
/// not say which ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchEmbeddingResult {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub items: Vec<EmbeddedProduct>,
    #[serde(default)]
    pub already_embedded: usize,
}

/// Stored documents may carry explicit `null`s for optional fields.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoriesField {
    List(Vec<String>),
    Text(String),
}

fn deserialize_categories<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let field = Option::<CategoriesField>::deserialize(deserializer)?;
    Ok(match field {
        Some(CategoriesField::List(list)) => list,
        Some(CategoriesField::Text(text)) => text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    })
}
