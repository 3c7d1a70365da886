//! Site adapters and the origin-keyed router.
//!
//! Each supported site implements [`SiteAdapter`]: decomposition of a
//! series or episode URL into [`EpisodeRef`]s, and extraction of a single
//! episode into a [`NovelRecord`]. [`SiteRouter`] dispatches on the exact
//! URL origin.

pub mod html;
pub mod http;
mod kakuyomu;
mod pixiv;
mod syosetu;

pub use http::{FetchRequest, FetchResponse, Fetcher, ReqwestTransport, Transport};
pub use kakuyomu::KakuyomuAdapter;
pub use pixiv::PixivAdapter;
pub use syosetu::SyosetuAdapter;

use crate::credentials::CredentialStore;
use crate::error::SourceError;
use crate::utils::{InputUrl, origin_key};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// One episode produced by decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    /// Episode title, when the site listing provides one.
    pub title: Option<String>,

    /// Episode URL, or the input URL for passthrough.
    pub url: String,
}

impl EpisodeRef {
    pub fn untitled(url: impl Into<String>) -> Self {
        Self {
            title: None,
            url: url.into(),
        }
    }

    pub fn titled(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            url: url.into(),
        }
    }
}

/// Extracted content and metadata of one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NovelRecord {
    /// Episode title.
    pub title: String,

    /// Site-defined position label.
    #[serde(rename = "indexPrefix")]
    pub index_prefix: String,

    /// Plain text body, one paragraph per line.
    pub content: String,

    /// `"{series_title} - {author}"`.
    pub series_title_and_author: String,

    pub series_title: String,

    /// The URL the record was extracted from.
    pub url: String,

    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Builds the composite series label used by every adapter.
pub fn series_title_and_author(series_title: &str, author: &str) -> String {
    format!("{} - {}", series_title, author)
}

/// Sites known to the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteId {
    Syosetu,
    Pixiv,
    Kakuyomu,
}

impl SiteId {
    pub const ALL: [SiteId; 3] = [SiteId::Syosetu, SiteId::Pixiv, SiteId::Kakuyomu];

    /// Identifier used in cookie file names.
    pub fn as_str(self) -> &'static str {
        match self {
            SiteId::Syosetu => "syosetu",
            SiteId::Pixiv => "pixiv",
            SiteId::Kakuyomu => "kakuyomu",
        }
    }

    /// URL whose cookies are sent to this site.
    pub fn cookie_url(self) -> &'static str {
        match self {
            SiteId::Syosetu => "https://ncode.syosetu.com/",
            SiteId::Pixiv => "https://www.pixiv.net/",
            SiteId::Kakuyomu => "https://kakuyomu.jp/",
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Let adapters attach stored site cookies to their requests.
    pub with_cookies: bool,
}

/// Everything an adapter call needs besides the URL.
#[derive(Clone)]
pub struct RequestContext {
    pub options: Options,
    pub credentials: Arc<dyn CredentialStore>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(options: Options, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            options,
            credentials,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stored cookie for a site, only when cookies are enabled for this call.
    pub async fn cookie_for(&self, site: SiteId) -> Option<String> {
        if !self.options.with_cookies {
            return None;
        }
        self.credentials.get_cookie(site).await
    }

    /// Writes refreshed cookies back, only when cookies are enabled for this call.
    pub async fn store_cookies(&self, site: SiteId, set_cookie_headers: &[String]) {
        if self.options.with_cookies && !set_cookie_headers.is_empty() {
            self.credentials.set_cookie(site, set_cookie_headers).await;
        }
    }
}

/// Decomposition and extraction for one site origin.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Human-readable site name.
    fn name(&self) -> &'static str;

    /// Credential store key for this site.
    fn site(&self) -> SiteId;

    /// Normalized origin this adapter is registered under.
    fn origin(&self) -> &'static str;

    /// Expands a URL into episode references, in reading order.
    async fn decompose(
        &self,
        url: &Url,
        ctx: &RequestContext,
    ) -> Result<Vec<EpisodeRef>, SourceError>;

    /// Extracts a single episode.
    async fn extract(&self, url: &Url, ctx: &RequestContext) -> Result<NovelRecord, SourceError>;
}

/// Decomposition for origins without an adapter: the input token itself, untitled.
pub fn passthrough(input: &InputUrl) -> Vec<EpisodeRef> {
    vec![EpisodeRef::untitled(input.raw.as_str())]
}

/// Origin-keyed registry of site adapters.
pub struct SiteRouter {
    adapters: HashMap<&'static str, Arc<dyn SiteAdapter>>,
}

impl SiteRouter {
    /// Creates a router with every built-in adapter.
    pub fn new(fetcher: Fetcher) -> Self {
        let adapters: Vec<Arc<dyn SiteAdapter>> = vec![
            Arc::new(SyosetuAdapter::general(fetcher.clone())),
            Arc::new(SyosetuAdapter::adult(fetcher.clone())),
            Arc::new(PixivAdapter::new(fetcher.clone())),
            Arc::new(KakuyomuAdapter::new(fetcher)),
        ];
        Self::from_adapters(adapters)
    }

    /// Creates a router from an explicit adapter list. Later adapters win on
    /// duplicate origins.
    pub fn from_adapters(adapters: Vec<Arc<dyn SiteAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.origin(), adapter))
            .collect();
        Self { adapters }
    }

    /// Finds the adapter registered for the URL's origin.
    pub fn route(&self, url: &Url) -> Option<&dyn SiteAdapter> {
        self.adapters
            .get(origin_key(url).as_str())
            .map(|adapter| adapter.as_ref())
    }

    /// Registered origins, sorted.
    pub fn origins(&self) -> Vec<&'static str> {
        let mut origins: Vec<_> = self.adapters.keys().copied().collect();
        origins.sort_unstable();
        origins
    }

    /// Decomposes one URL, passing unknown origins through unchanged.
    pub async fn decompose(
        &self,
        input: &InputUrl,
        ctx: &RequestContext,
    ) -> Result<Vec<EpisodeRef>, SourceError> {
        match self.route(&input.url) {
            Some(adapter) => {
                tracing::debug!(adapter = adapter.name(), url = %input.url, "decomposing");
                adapter.decompose(&input.url, ctx).await
            }
            None => Ok(passthrough(input)),
        }
    }

    /// Extracts one episode. Unknown origins fail with `UnsupportedSite`.
    pub async fn extract(&self, url: &Url, ctx: &RequestContext) -> Result<NovelRecord, SourceError> {
        let adapter = self
            .route(url)
            .ok_or_else(|| SourceError::UnsupportedSite(origin_key(url)))?;
        tracing::debug!(adapter = adapter.name(), %url, "extracting");
        adapter.extract(url, ctx).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    pub fn context(with_cookies: bool) -> RequestContext {
        RequestContext::new(
            Options { with_cookies },
            Arc::new(MemoryCredentialStore::new()),
        )
    }

    pub fn context_with_store(
        with_cookies: bool,
        store: Arc<MemoryCredentialStore>,
    ) -> RequestContext {
        RequestContext::new(Options { with_cookies }, store)
    }

    pub fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    pub fn input(s: &str) -> InputUrl {
        InputUrl::parse(s).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::http::testing::{FakeTransport, fetcher};
    use super::testing::{context, input, url};
    use super::*;

    fn router() -> (Arc<FakeTransport>, SiteRouter) {
        let transport = Arc::new(FakeTransport::new());
        let router = SiteRouter::new(fetcher(&transport));
        (transport, router)
    }

    #[test]
    fn test_registered_origins() {
        let (_, router) = router();
        assert_eq!(
            router.origins(),
            vec![
                "https://kakuyomu.jp",
                "https://ncode.syosetu.com",
                "https://novel18.syosetu.com",
                "https://www.pixiv.net",
            ]
        );
    }

    #[test]
    fn test_route_requires_exact_origin() {
        let (_, router) = router();
        assert_eq!(
            router
                .route(&url("https://www.pixiv.net/novel/series/1"))
                .map(|a| a.name()),
            Some("Pixiv")
        );
        assert!(router.route(&url("http://www.pixiv.net/novel/series/1")).is_none());
        assert!(router.route(&url("https://pixiv.net/novel/series/1")).is_none());
        assert!(router.route(&url("https://kakuyomu.jp:8443/works/1")).is_none());
    }

    #[tokio::test]
    async fn test_unknown_origin_passes_through() {
        let (transport, router) = router();
        let token = input("https://Example.com/some/story?page=2");

        let refs = router.decompose(&token, &context(false)).await.unwrap();

        assert_eq!(refs, vec![EpisodeRef::untitled("https://Example.com/some/story?page=2")]);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_scheme_mismatch_passes_through() {
        let (transport, router) = router();
        let token = input("http://ncode.syosetu.com/n1234ab");

        let refs = router.decompose(&token, &context(false)).await.unwrap();

        assert_eq!(refs, vec![EpisodeRef::untitled("http://ncode.syosetu.com/n1234ab")]);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_origin_extraction_fails() {
        let (_, router) = router();
        let err = router
            .extract(&url("https://example.com/story/1"), &context(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedSite(origin) if origin == "https://example.com"));
    }

    #[test]
    fn test_record_serializes_index_prefix_camel_case() {
        let record = NovelRecord {
            title: "第一話".to_string(),
            index_prefix: "0001".to_string(),
            content: "本文".to_string(),
            series_title_and_author: series_title_and_author("作品", "作者"),
            series_title: "作品".to_string(),
            url: "https://ncode.syosetu.com/n1234ab/1/".to_string(),
            author: "作者".to_string(),
            tags: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["indexPrefix"], "0001");
        assert_eq!(json["series_title_and_author"], "作品 - 作者");
        assert!(json.get("tags").is_none());
    }

    #[tokio::test]
    async fn test_cookies_only_when_enabled() {
        use crate::credentials::MemoryCredentialStore;
        let store = Arc::new(MemoryCredentialStore::with_cookie(SiteId::Pixiv, "a=1"));

        let off = testing::context_with_store(false, store.clone());
        assert_eq!(off.cookie_for(SiteId::Pixiv).await, None);
        off.store_cookies(SiteId::Pixiv, &["b=2".to_string()]).await;
        assert_eq!(store.get_cookie(SiteId::Pixiv).await.as_deref(), Some("a=1"));

        let on = testing::context_with_store(true, store.clone());
        assert_eq!(on.cookie_for(SiteId::Pixiv).await.as_deref(), Some("a=1"));
    }
}
