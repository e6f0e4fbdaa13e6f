//! Error types for configuration, HTTP client setup and the event stream.
//!
//! One-shot API requests never surface these: the API client folds every
//! failure into an `ApiResponse` with an inspectable status instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HOME directory not found")]
    NoHomeDir,

    #[error("Invalid URL for {field}: {value:?} (expected http:// or https://)")]
    InvalidUrl { field: &'static str, value: String },

    #[error("Operator id is required (pass --operator-id or set GUIDEWATCH_OPERATOR_ID)")]
    MissingOperatorId,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file malformed: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why a live stream stopped. Rendered into `StreamEvent::Broken`.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Stream rejected with status {0}")]
    Status(u16),

    #[error("Stream body read failed: {0}")]
    Body(String),

    #[error("Stream ended by server")]
    Ended,
}
