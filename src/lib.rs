//! Shiori - web novel URL decomposition and episode extraction.
//!
//! This library provides functionality for:
//! - Expanding series URLs from Syosetu, Pixiv and Kakuyomu into ordered episode URLs
//! - Extracting the text and metadata of a single episode
//! - Loading site cookies for session-gated content

pub mod config;
pub mod console;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use credentials::{CookieFileStore, CredentialStore, MemoryCredentialStore};
pub use error::{ConfigError, CredentialError, SourceError};
pub use pipeline::{
    DecomposeRequest, DecomposeResponse, ExtractRequest, FailedUrl, PartialDecomposition, Pipeline,
};
pub use sources::{EpisodeRef, NovelRecord, Options, RequestContext, SiteAdapter, SiteId, SiteRouter};
