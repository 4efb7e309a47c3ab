//! Error taxonomy shared by every component.
//!
//! Mirrors the distinction the design draws between retryable transport
//! failures, protocol-level (non-2xx) failures, decode/parse failures that
//! are tolerated locally, and store/invariant failures that are not.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("non-2xx response ({status}) fetching {url}")]
    Protocol { url: String, status: u16 },

    #[error("gzip decode error: {0}")]
    Decode(String),

    #[error("CDX parse error on line: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Store(err.to_string())
    }
}
