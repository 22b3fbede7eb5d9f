//! Conversions from external infrastructure errors into domain errors.

use std::io;
use std::path::Path;

use reqwest::Error as HttpError;
use twinline_common::CommonError;
use twinline_domain::{ApiError, CacheError};

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ApiError */
/* -------------------------------------------------------------------------- */

/// Map a transport failure into [`ApiError::Transport`] with endpoint context.
pub fn transport_error(endpoint: &str, err: &HttpError) -> ApiError {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_builder() {
        "invalid request"
    } else if err.is_body() || err.is_decode() {
        "response body unreadable"
    } else {
        "http request failed"
    };

    ApiError::Transport {
        endpoint: endpoint.to_string(),
        message: format!("{kind}: {err}"),
        is_timeout: err.is_timeout(),
    }
}

/* -------------------------------------------------------------------------- */
/* CommonError / io::Error → CacheError */
/* -------------------------------------------------------------------------- */

/// Wrap an I/O failure on the cache file.
pub fn cache_io_error(path: &Path, err: &io::Error) -> CacheError {
    CacheError::Io { path: path.display().to_string(), message: err.to_string() }
}

/// Classify a crypto-layer failure while reading the cache.
pub fn cache_crypto_error(err: CommonError) -> CacheError {
    match err {
        CommonError::Encoding { format, message } => {
            CacheError::Decode(format!("{format}: {message}"))
        }
        CommonError::Crypto { message } | CommonError::Internal { message } => {
            CacheError::Decrypt(message)
        }
    }
}
