//! Pixiv (www.pixiv.net/novel) adapter.
//!
//! Series are expanded through the `content_titles` ajax endpoint, which
//! lists every work in reading order along with an availability flag.
//! Single novels are extracted from the novel ajax endpoint and their
//! pixiv markup is flattened to plain text.

use super::{
    EpisodeRef, FetchRequest, Fetcher, NovelRecord, RequestContext, SiteAdapter, SiteId,
    series_title_and_author,
};
use crate::error::SourceError;
use crate::utils::index_label;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use url::Url;

const ORIGIN: &str = "https://www.pixiv.net";

/// Pixiv rejects ajax calls without a browser-like User-Agent.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:146.0) Gecko/20100101 Firefox/146.0";

/// Series page path: `/novel/series/{id}`.
static SERIES_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/novel/series/(\d+)/?$").unwrap());

/// `[[rb:base > reading]]`
static RUBY_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[rb:\s*(.+?)\s*>\s*.+?\]\]").unwrap());

/// `[[jumpuri:label > https://...]]`
static JUMPURI_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[jumpuri:\s*(.+?)\s*>\s*.+?\]\]").unwrap());

/// `[chapter:heading]`
static CHAPTER_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[chapter:\s*(.*?)\s*\]").unwrap());

/// `[pixivimage:123]`, `[uploadedimage:123]`, `[jump:3]`
static DROPPED_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:pixivimage|uploadedimage|jump):[^\]]*\]").unwrap());

/// `[newpage]` on a line of its own.
static NEWPAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\[newpage\][ \t]*$").unwrap());

/// `[newpage]` inside running text.
static NEWPAGE_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\[newpage\][ \t]*").unwrap());

/// Kind of Pixiv page a URL points at.
#[derive(Debug, Clone, PartialEq)]
enum PixivUrlType {
    Series(String),
    Show,
}

/// API response wrapper.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

/// Entry of the series `content_titles` listing.
#[derive(Debug, Deserialize)]
struct ContentTitle {
    id: String,
    available: bool,
    #[serde(default)]
    title: String,
}

/// Novel info from the novel endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NovelBody {
    title: String,
    user_name: String,
    content: Option<String>,
    #[serde(default)]
    tags: Option<TagList>,
    #[serde(default)]
    series_nav_data: Option<SeriesNavData>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    tag: String,
}

/// Position of a novel inside its series.
#[derive(Debug, Deserialize)]
struct SeriesNavData {
    title: String,
    order: u32,
}

/// Pixiv adapter for www.pixiv.net.
pub struct PixivAdapter {
    fetcher: Fetcher,
}

impl PixivAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Classifies a Pixiv URL by its path.
    fn parse_url(url: &Url) -> Result<PixivUrlType, SourceError> {
        let path = url.path();
        if path.contains("/ajax/") {
            return Err(SourceError::AjaxUrlNotAllowed(url.to_string()));
        }
        if let Some(caps) = SERIES_PATH.captures(path) {
            return Ok(PixivUrlType::Series(caps[1].to_string()));
        }
        if path.contains("/novel/show") {
            return Ok(PixivUrlType::Show);
        }
        Err(SourceError::UnsupportedPixivPath(url.to_string()))
    }

    /// Builds an ajax request, attaching stored cookies when enabled.
    async fn ajax_request(&self, url: String, ctx: &RequestContext) -> FetchRequest {
        let mut request = FetchRequest::new(url)
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Accept", "application/json")
            .header("Referer", "https://www.pixiv.net/");
        if let Some(cookie) = ctx.cookie_for(self.site()).await {
            request = request.header("Cookie", cookie);
        }
        request
    }

    /// Calls an ajax endpoint and unwraps its `body`.
    async fn call_ajax<T: DeserializeOwned>(
        &self,
        url: String,
        ctx: &RequestContext,
    ) -> Result<T, SourceError> {
        let request = self.ajax_request(url, ctx).await;
        let (api_response, response) = self
            .fetcher
            .get_json::<ApiResponse<T>>(&request, &ctx.cancel)
            .await?;
        ctx.store_cookies(self.site(), &response.set_cookies).await;

        if api_response.error {
            return Err(SourceError::remote_api(
                &request.url,
                format!("API error: {}", api_response.message),
            ));
        }

        api_response
            .body
            .ok_or_else(|| SourceError::remote_api(&request.url, "API response missing body"))
    }

    async fn series_episodes(
        &self,
        series_id: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<EpisodeRef>, SourceError> {
        let api_url = format!(
            "{}/ajax/novel/series/{}/content_titles",
            ORIGIN, series_id
        );
        let titles: Vec<ContentTitle> = self.call_ajax(api_url, ctx).await?;
        let total = titles.len();

        let episodes: Vec<EpisodeRef> = titles
            .into_iter()
            .filter(|entry| entry.available)
            .map(|entry| EpisodeRef::titled(entry.title, show_url(&entry.id)))
            .collect();

        if episodes.len() < total {
            tracing::debug!(
                series_id,
                skipped = total - episodes.len(),
                "skipping unavailable series entries"
            );
        }

        Ok(episodes)
    }
}

fn show_url(novel_id: &str) -> String {
    format!("{}/novel/show.php?id={}", ORIGIN, novel_id)
}

/// Flattens pixiv novel markup into plain text.
fn normalize_markup(content: &str) -> String {
    let text = content.replace("\r\n", "\n");
    let text = RUBY_MARKUP.replace_all(&text, "$1");
    let text = JUMPURI_MARKUP.replace_all(&text, "$1");
    let text = CHAPTER_MARKUP.replace_all(&text, "$1");
    let text = DROPPED_MARKUP.replace_all(&text, "");
    let text = NEWPAGE_LINE.replace_all(&text, "");
    let text = NEWPAGE_INLINE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn into_record(body: NovelBody, url: &Url) -> Result<NovelRecord, SourceError> {
    let content = body
        .content
        .map(|c| normalize_markup(&c))
        .filter(|c| !c.is_empty())
        .ok_or_else(|| SourceError::extraction(url.as_str(), "novel content"))?;

    let title = body.title.trim().to_string();
    if title.is_empty() {
        return Err(SourceError::extraction(url.as_str(), "novel title"));
    }
    let author = body.user_name.trim().to_string();
    if author.is_empty() {
        return Err(SourceError::extraction(url.as_str(), "author"));
    }

    let (series_title, index_prefix) = match body.series_nav_data {
        Some(series) => (series.title, index_label(series.order)),
        None => (title.clone(), String::new()),
    };

    let tags = body
        .tags
        .map(|list| list.tags.into_iter().map(|t| t.tag).collect::<Vec<_>>())
        .filter(|tags| !tags.is_empty());

    Ok(NovelRecord {
        series_title_and_author: series_title_and_author(&series_title, &author),
        title,
        index_prefix,
        content,
        series_title,
        url: url.to_string(),
        author,
        tags,
    })
}

#[async_trait]
impl SiteAdapter for PixivAdapter {
    fn name(&self) -> &'static str {
        "Pixiv"
    }

    fn site(&self) -> SiteId {
        SiteId::Pixiv
    }

    fn origin(&self) -> &'static str {
        ORIGIN
    }

    async fn decompose(
        &self,
        url: &Url,
        ctx: &RequestContext,
    ) -> Result<Vec<EpisodeRef>, SourceError> {
        match Self::parse_url(url)? {
            PixivUrlType::Series(series_id) => self.series_episodes(&series_id, ctx).await,
            PixivUrlType::Show => Ok(vec![EpisodeRef::untitled(url.as_str())]),
        }
    }

    async fn extract(&self, url: &Url, ctx: &RequestContext) -> Result<NovelRecord, SourceError> {
        if Self::parse_url(url)? != PixivUrlType::Show {
            return Err(SourceError::UnsupportedPixivPath(url.to_string()));
        }

        let novel_id = url
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| SourceError::UnsupportedPixivPath(url.to_string()))?;

        let api_url = format!("{}/ajax/novel/{}", ORIGIN, novel_id);
        let body: NovelBody = self.call_ajax(api_url, ctx).await?;
        into_record(body, url)
    }
}
