//! Error types for the crawling engine.
//!
//! `CrawlError` covers the failures the engine itself can surface:
//! misconfiguration (the only fatal kind), transport failures and URL
//! parsing. Errors raised by user callbacks and result sinks are
//! `anyhow::Error` values; the engine logs them and never propagates them
//! across request branches.

use thiserror::Error;

/// Errors produced by the crawling engine.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Invalid engine configuration. Raised at construction time and fatal.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A transport-level failure from the HTTP client.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Whether a transport failure is presumed recoverable by retrying.
///
/// Connection failures and timeouts are transient; everything else
/// (invalid bodies, redirect loops, builder errors) is not.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}
