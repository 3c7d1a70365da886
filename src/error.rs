//! Error types for Shiori.
//!
//! Uses `thiserror` for structured error definitions so callers can match
//! on the kind of failure instead of parsing messages.

use thiserror::Error;

/// Error type for decomposition and extraction.
#[derive(Error, Debug)]
pub enum SourceError {
    /// An input token is not a valid absolute URL.
    #[error("Invalid URL '{token}': {reason}")]
    InvalidUrl { token: String, reason: String },

    /// A Syosetu URL with a path shape that is neither a series nor an episode.
    #[error("URL does not point to a Syosetu series or episode: {0}")]
    InvalidSyosetsuUrl(String),

    /// A Pixiv URL with a path shape that is neither a series nor a novel page.
    #[error("URL is not a Pixiv novel series or novel page: {0}")]
    UnsupportedPixivPath(String),

    /// The caller passed Pixiv's internal API URL instead of the page URL.
    #[error("Pixiv ajax URLs are not accepted, use the normal page URL instead: {0}")]
    AjaxUrlNotAllowed(String),

    /// Extraction requested for an origin with no extractor.
    #[error("No extractor for site: {0}")]
    UnsupportedSite(String),

    /// A remote API answered with an unexpected payload.
    #[error("Unexpected response from {url}: {message}")]
    RemoteApi { url: String, message: String },

    /// Expected content was missing from the fetched page.
    #[error("Could not extract {field} from {url}")]
    ExtractionFailed { url: String, field: String },

    /// Transport-level failure reaching a remote host.
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Remote host answered with a non-success status.
    #[error("HTTP {status} when fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl SourceError {
    /// Returns true for failures worth retrying: timeouts, connection errors,
    /// rate limiting and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Network { source, .. } => source.is_timeout() || source.is_connect(),
            SourceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn remote_api(url: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::RemoteApi {
            url: url.into(),
            message: message.into(),
        }
    }

    pub(crate) fn extraction(url: impl Into<String>, field: impl Into<String>) -> Self {
        SourceError::ExtractionFailed {
            url: url.into(),
            field: field.into(),
        }
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Errors that can occur while loading stored site cookies.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Failed to read or walk the filesystem.
    #[error("Failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// Cookie file contains an invalid line.
    #[error("Invalid Netscape cookie line: {0}")]
    InvalidLine(String),
}
