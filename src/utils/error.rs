//! Error types shared across the transport and persistence layers.
//!
//! The broker's public API never surfaces these directly; they are
//! classified at task boundaries into retry, eviction, or a log line.

use thiserror::Error;

/// Failure of one outbound POST over a unix socket.
///
/// The publish pipeline keys its policy off the variant: `Connect` is
/// terminal for the subscriber, `Timeout` is retried, everything else is
/// logged and dropped.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("http error: {0}")]
    Protocol(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),
}

/// Failure in the local key/value store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend: {0}")]
    Backend(#[from] sled::Error),

    #[error("stored value is not utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
