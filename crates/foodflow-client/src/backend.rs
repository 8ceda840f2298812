//! HTTP client for the FoodFlow inventory backend.
//!
//! The backend stores products, proxies the remote food database and fronts
//! the embedding server. Routes used here:
//!
//! | Method | Route                          | Purpose                          |
//! |--------|--------------------------------|----------------------------------|
//! | GET    | `api/products`                 | page of stored products          |
//! | GET    | `api/products/remote/search`   | remote food database search      |
//! | POST   | `api/products/import`          | import one product by barcode    |
//! | POST   | `api/embeddings/generate`      | bulk embedding generation        |
//!
//! Every request is made once. Failed requests are classified into
//! [`AppError`] variants and left to the orchestrators to count.

use std::collections::HashSet;

use foodflow_core::error::AppError;
use foodflow_core::traits::{EmbeddingBackend, ProductImporter};
use foodflow_core::{BackendConfig, BatchEmbeddingResult, EmbeddedProduct, Product, ProductEmbeddings};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Serialize, Debug)]
struct ImportRequest<'a> {
    barcode: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImportResponse {
    product: Product,
}

/// Body of `POST api/embeddings/generate`. `force` is only sent when set.
#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    force: bool,
}

/// Response of `POST api/embeddings/generate`.
///
/// When nothing needed embedding the backend answers with counters only.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    updated: usize,
    #[serde(default)]
    model: String,
    #[serde(default)]
    skipped: usize,
    #[serde(default)]
    updated_products: Vec<UpdatedProduct>,
}

#[derive(Deserialize, Debug)]
struct UpdatedProduct {
    id: String,
    #[serde(default)]
    embeddings: Option<ProductEmbeddings>,
}

impl GenerateResponse {
    /// Keeps the products that actually carry embeddings.
    ///
    /// A response that neither embedded nor skipped anything means the
    /// backend found none of the requested products.
    fn into_batch_result(self) -> Result<BatchEmbeddingResult, AppError> {
        if self.count == 0 && self.skipped == 0 && self.updated_products.is_empty() {
            return Err(AppError::EmptyResponse);
        }

        let items = self
            .updated_products
            .into_iter()
            .filter_map(|p| {
                let embeddings = p.embeddings.filter(ProductEmbeddings::is_present)?;
                Some(EmbeddedProduct {
                    id: p.id,
                    embeddings,
                })
            })
            .collect();

        Ok(BatchEmbeddingResult {
            model: self.model,
            items,
            already_embedded: self.skipped,
        })
    }
}

/// Error body returned by the backend: `{"error": "product_not_found_remote"}`.
#[derive(Deserialize, Debug)]
struct ErrorBody {
    error: String,
}

/// One page of products, as returned by the list and remote search routes.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default, deserialize_with = "skip_invalid_products")]
    pub products: Vec<Product>,
}

fn first_page() -> u32 {
    1
}

/// Drops rows that are not valid products (e.g. a remote hit without a
/// barcode) instead of failing the whole page.
fn skip_invalid_products<'de, D>(deserializer: D) -> Result<Vec<Product>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<Product>(row) {
            Ok(product) => Some(product),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed product row");
                None
            }
        })
        .collect())
}

/// HTTP client for the inventory backend.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Examples
///
/// ```no_run
/// use foodflow_client::BackendClient;
/// use foodflow_core::BackendConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = BackendClient::new(&BackendConfig::default())?;
/// let page = client.list_products("nutella", 1, 50).await?;
/// println!("{} stored products match", page.total);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    timeout_secs: u64,
}

impl BackendClient {
    const USER_AGENT: &'static str = concat!("foodflow/", env!("CARGO_PKG_VERSION"));

    /// Creates a client for the backend at `config.url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the URL is malformed.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let mut raw = config.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|_| AppError::InvalidUrl(config.url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidUrl(config.url.clone()));
        }

        let client = Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    /// Imports a product from the remote food database by barcode.
    ///
    /// The backend upserts the product by code and returns the stored record.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if the remote database has no such barcode.
    pub async fn import_by_barcode(&self, barcode: &str) -> Result<Product, AppError> {
        let url = self.endpoint("api/products/import")?;
        let response = self
            .client
            .post(url)
            .json(&ImportRequest { barcode })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = check_status(response).await?;

        let body: ImportResponse = response
            .json()
            .await
            .map_err(|e| AppError::ClientError(format!("Failed to parse import response: {}", e)))?;

        tracing::debug!(code = %barcode, id = %body.product.id, "Product imported");
        Ok(body.product)
    }

    /// Requests embeddings for the stored products with the given ids.
    pub async fn generate_embeddings(
        &self,
        ids: &[String],
        force: bool,
    ) -> Result<BatchEmbeddingResult, AppError> {
        if ids.is_empty() {
            return Ok(BatchEmbeddingResult::default());
        }

        let url = self.endpoint("api/embeddings/generate")?;
        let response = self
            .client
            .post(url)
            .json(&GenerateRequest { ids, force })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = check_status(response).await?;

        let body: GenerateResponse = response.json().await.map_err(|e| {
            AppError::ClientError(format!("Failed to parse embedding response: {}", e))
        })?;

        tracing::debug!(
            requested = ids.len(),
            count = body.count,
            updated = body.updated,
            skipped = body.skipped,
            model = %body.model,
            "Embedding batch answered"
        );
        body.into_batch_result()
    }

    /// Fetches a page of stored products, newest first.
    pub async fn list_products(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage, AppError> {
        let mut url = self.endpoint("api/products")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());

        self.get_page(url).await
    }

    /// Searches the remote food database through the backend proxy.
    ///
    /// Results are flagged `remote`. A blank query returns an empty page
    /// without a request.
    pub async fn search_remote(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(ProductPage {
                page,
                page_size,
                ..Default::default()
            });
        }

        let mut url = self.endpoint("api/products/remote/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());

        let mut result = self.get_page(url).await?;
        for product in &mut result.products {
            product.remote = true;
            if product.id.is_empty() {
                product.id = format!("remote:{}", product.code);
            }
        }
        Ok(result)
    }

    /// Loads the working collection for `query`: the first page of stored
    /// products followed by remote matches that are not stored yet.
    ///
    /// A failed remote search is logged and the stored products are still
    /// returned.
    pub async fn load_working_set(
        &self,
        query: &str,
        page_size: u32,
    ) -> Result<Vec<Product>, AppError> {
        let local = self.list_products(query, 1, page_size).await?;
        let remote = match self.search_remote(query, 1, page_size).await {
            Ok(page) => page.products,
            Err(e) => {
                tracing::warn!(error = %e, "Remote search failed, showing stored products only");
                Vec::new()
            }
        };

        Ok(merge_working_set(local.products, remote))
    }

    async fn get_page(&self, url: Url) -> Result<ProductPage, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| AppError::ClientError(format!("Failed to parse product page: {}", e)))
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Cannot connect to backend: {}", e))
        } else {
            AppError::ClientError(e.to_string())
        }
    }
}

/// Returns `response` if its status is a success, otherwise the matching error.
async fn check_status(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimitExceeded,
        _ => AppError::ClientError(format!("HTTP {}: {}", status.as_u16(), message)),
    }
}

/// Stored products first, then remote products whose code is not stored,
/// each code at most once.
fn merge_working_set(local: Vec<Product>, remote: Vec<Product>) -> Vec<Product> {
    let mut codes: HashSet<String> = local.iter().map(|p| p.code.clone()).collect();
    let mut products = local;
    products.extend(remote.into_iter().filter(|p| codes.insert(p.code.clone())));
    products
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl ProductImporter for BackendClient {
    async fn import_product(&self, code: &str) -> Result<Product, AppError> {
        self.import_by_barcode(code).await
    }
}

impl EmbeddingBackend for BackendClient {
    async fn generate_batch(
        &self,
        ids: &[String],
        force: bool,
    ) -> Result<BatchEmbeddingResult, AppError> {
        self.generate_embeddings(ids, force).await
    }
}
