//! Error types for the source adapters

use thiserror::Error;

/// Result type alias for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors that can occur while interpreting provider output
///
/// None of these escape `SourceAdapter::parse_response`; they are logged and
/// the cycle is treated as "no new data".
#[derive(Debug, Error)]
pub enum SourceError {
    /// The command produced no output at all
    #[error("Empty response from provider")]
    EmptyResponse,

    /// Output was not the JSON shape the provider documents
    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Provider name not recognised at configuration time
    #[error("Unknown source '{0}' (expected 'cloud-build' or 'github-actions')")]
    UnknownSource(String),
}

impl SourceError {
    /// Check if this error just means the provider had nothing to say
    pub fn is_empty_response(&self) -> bool {
        matches!(self, Self::EmptyResponse)
    }
}
