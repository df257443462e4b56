//! Error types for Synheart Ingest

use thiserror::Error;

/// Errors that can occur while ingesting or exporting data
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Malformed export header: {0}")]
    MalformedHeader(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[cfg(feature = "cloud")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Unexpected response: {0}")]
    ResponseError(String),
}

impl From<csv::IntoInnerError<csv::Writer<Vec<u8>>>> for IngestError {
    fn from(e: csv::IntoInnerError<csv::Writer<Vec<u8>>>) -> Self {
        IngestError::EncodingError(e.to_string())
    }
}
