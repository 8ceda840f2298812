use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every failure a sync or embedding run can observe.
/// Collaborator failures (import, embedding backend) are recorded per unit
/// by the worker pool and never escape an orchestrator; the remaining variants
/// surface from configuration loading and client construction.
///
/// # Error Conversion
///
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use foodflow_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed with a non-success status or an unexpected body.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The remote product or record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// API response contained no usable data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A run was started on a progress tracker that already has an active run.
    #[error("A run is already in progress")]
    RunInProgress,

    /// The unit was never processed because the run was cancelled.
    #[error("Run cancelled before this unit was processed")]
    Cancelled,

    /// The operation panicked; the panic was contained by the worker pool.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The backend may be slow or unreachable.\n   Try again later or check the backend URL.".to_string()
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect to backend: {}\n   Is the inventory backend running?",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your connection to the backend.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The backend may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::NotFound(what) => {
                format!("Not found: {}\n   The product may not exist in the food database.", what)
            }
            AppError::EmptyResponse => {
                "The API returned no data. The backend may be temporarily unavailable.".to_string()
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration file.",
                    msg
                )
            }
            AppError::RunInProgress => {
                "Another sync or embedding run is still in progress.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
