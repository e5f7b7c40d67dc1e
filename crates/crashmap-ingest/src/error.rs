//! Error types for the ingestion pipeline
//!
//! A dropped record is not an error; see [`crate::cleaner::Cleaned`].

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Transport failure or non-success status from the upstream API
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered, but the body is not the expected shape
    #[error("Decode error for {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The store transaction failed and was rolled back
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn decode(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Short label for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Network { .. } => "network",
            IngestError::Decode { .. } => "decode",
            IngestError::Persistence(_) => "persistence",
            IngestError::Config(_) => "config",
        }
    }
}
