//! Error type shared by the remote clients and the pipeline.
//!
//! The Markdown converter itself never fails; everything here comes from
//! configuration or from talking to an external service.

use thiserror::Error;

/// Errors that can occur while drafting and publishing articles.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error during {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote service answered with a non-success status.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// A call succeeded but returned nothing usable.
    #[error("Empty result from {context}")]
    UpstreamEmpty { context: String },

    /// A response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn http(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            context: context.into(),
            source,
        }
    }

    pub fn upstream_empty(context: impl Into<String>) -> Self {
        Self::UpstreamEmpty {
            context: context.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// True when the service asked us to slow down.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429,
            Self::Http { source, .. } => source.status().is_some_and(|s| s.as_u16() == 429),
            other => other.to_string().contains("429"),
        }
    }

    /// True for failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Io(_) | Self::Toml(_) => false,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Http { .. }
            | Self::UpstreamEmpty { .. }
            | Self::InvalidResponse(_)
            | Self::Json(_) => true,
        }
    }
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
