//! Error types for the outpainting pipeline.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while generating, extending or inpainting images.
#[derive(Debug, thiserror::Error)]
pub enum WidefillError {
    /// Prompt CSV does not exist.
    #[error("CSV file '{}' not found", .0.display())]
    InputNotFound(PathBuf),

    /// Aspect ratio outside the supported set.
    #[error("unsupported aspect ratio: {0}")]
    UnsupportedAspectRatio(String),

    /// Invalid request parameters or image geometry.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Prediction polling exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Result URL expired before download.
    #[error("download URL expired")]
    UrlExpired,

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Response parsed but did not carry what we need.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data or detect an image format.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// Image bytes could not be decoded or encoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed prompt CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, WidefillError>;

/// Longest error body kept in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Redacts API credentials and truncates an upstream error body.
///
/// Error bodies sometimes echo the request headers back, so anything that
/// looks like an OpenAI (`sk-...`) or Replicate (`r8_...`) token is masked.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_inclusive(char::is_whitespace)
        .map(|word| {
            let trimmed = word.trim_start_matches(|c: char| c == '"' || c == '\'');
            if trimmed.starts_with("sk-") || trimmed.starts_with("r8_") {
                let trailing: String = word.chars().filter(|c| c.is_whitespace()).collect();
                format!("[REDACTED]{trailing}")
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = redacted.concat();
    let joined = joined.trim();

    if joined.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = joined.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{cut}...")
    } else {
        joined.to_string()
    }
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
