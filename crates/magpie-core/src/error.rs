use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents all possible errors that can occur in the Magpie
/// application. It uses the `thiserror` crate for ergonomic error handling and
/// automatic conversion from underlying library errors.
///
/// # Error Conversion
///
/// Most errors automatically convert from their source types using the `#[from]` attribute:
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use magpie_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     // Errors automatically convert
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// This error wraps all errors from SQLx database operations, including
    /// connection failures, query errors, and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP client request failed.
    ///
    /// This error occurs when HTTP requests fail due to malformed responses
    /// or non-retryable upstream status codes.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// Network or connection error.
    ///
    /// This error occurs when a network request fails due to connectivity issues,
    /// DNS resolution failures, or the remote server being unreachable.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    ///
    /// This error occurs when a request takes longer than the configured timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    ///
    /// This error occurs when too many requests are made in a short period.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Gateway authentication failed.
    ///
    /// This error occurs when the token endpoint rejects the configured
    /// client credentials. It is never retried automatically.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// JSON serialization or deserialization failed.
    ///
    /// This error occurs when converting between Rust types and JSON,
    /// typically when parsing API responses.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A required field was absent from an upstream payload.
    ///
    /// Raised at record construction time so that malformed items fail fast
    /// instead of surfacing as a late field-access error.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The requested ingestion time range is invalid.
    ///
    /// The start epoch must be strictly greater than the end epoch (the
    /// cursor moves backward in time).
    #[error("Invalid time range: start {start} must be after end {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    /// API response contained no data.
    ///
    /// This error occurs when an API returns a successful status but
    /// the response body is empty or missing expected data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Configuration file error.
    ///
    /// This error occurs when reading or parsing the configuration file fails,
    /// such as when magpie.toml is malformed or contains invalid values.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                format!("Database error: {}\n   Check the database path and file permissions.", e)
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The upstream service may be slow or unreachable.\n   Try again later.".to_string()
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!("Request timed out after {} seconds.\n   The server may be overloaded. Try again later.", secs)
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::AuthFailed(msg) => {
                format!(
                    "Authentication failed: {}\n   Check the [gateway] credentials in your configuration.",
                    msg
                )
            }
            AppError::InvalidTimeRange { start, end } => {
                format!(
                    "Invalid time range: start epoch {} must be after end epoch {} (ingestion walks backward in time).",
                    start, end
                )
            }
            AppError::EmptyResponse => {
                "The API returned no data. The service may be temporarily unavailable.".to_string()
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration file.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use magpie_core::error::AppError;
    ///
    /// // Network errors are retryable
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// // Rate limits are retryable (after a delay)
    /// let err = AppError::RateLimitExceeded;
    /// assert!(err.is_retryable());
    ///
    /// // Configuration errors are NOT retryable
    /// let err = AppError::ConfigError("bad range".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::EmptyResponse => true,
            // Server errors arrive wrapped in ClientError; malformed-payload
            // errors do not benefit from a retry.
            AppError::ClientError(msg) => {
                msg.contains("HTTP 5")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connect")
            }
            _ => false,
        }
    }
}
