//! Kakuyomu (kakuyomu.jp) adapter.
//!
//! Episode pages only: decomposition hands URLs back unchanged.

use super::html::{first_text, paragraph_text};
use super::{
    EpisodeRef, FetchRequest, Fetcher, NovelRecord, RequestContext, SiteAdapter, SiteId,
    series_title_and_author,
};
use crate::error::SourceError;
use crate::utils::path_segments;
use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

const ORIGIN: &str = "https://kakuyomu.jp";

/// CSS selectors used for parsing episode pages.
struct Selectors {
    episode_title: Selector,
    work_title: Selector,
    author: Selector,
    body: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            episode_title: Selector::parse(".widget-episodeTitle").unwrap(),
            work_title: Selector::parse("#contentMain-header-workTitle").unwrap(),
            author: Selector::parse("#contentMain-header-author").unwrap(),
            body: Selector::parse(".widget-episodeBody").unwrap(),
            paragraph: Selector::parse("p").unwrap(),
        }
    }
}

/// Parsed fields of an episode page.
#[derive(Debug)]
struct EpisodePage {
    title: String,
    work_title: String,
    author: String,
    content: String,
}

/// Kakuyomu adapter for kakuyomu.jp.
pub struct KakuyomuAdapter {
    fetcher: Fetcher,
    selectors: Selectors,
}

impl KakuyomuAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            selectors: Selectors::new(),
        }
    }

    /// Returns the episode id of a `/works/{work}/episodes/{episode}` URL.
    fn episode_id(url: &Url) -> Option<&str> {
        match path_segments(url).as_slice() {
            ["works", _, "episodes", episode] => Some(*episode),
            _ => None,
        }
    }

    fn parse_episode(&self, html: &str, url: &str) -> Result<EpisodePage, SourceError> {
        let doc = Html::parse_document(html);
        let s = &self.selectors;

        let title = first_text(&doc, &[&s.episode_title])
            .ok_or_else(|| SourceError::extraction(url, "episode title"))?;
        let work_title = first_text(&doc, &[&s.work_title])
            .ok_or_else(|| SourceError::extraction(url, "work title"))?;
        let author = first_text(&doc, &[&s.author])
            .ok_or_else(|| SourceError::extraction(url, "author"))?;

        let content = doc
            .select(&s.body)
            .next()
            .map(|body| paragraph_text(body, &s.paragraph))
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| SourceError::extraction(url, "episode body"))?;

        Ok(EpisodePage {
            title,
            work_title,
            author,
            content,
        })
    }
}

#[async_trait]
impl SiteAdapter for KakuyomuAdapter {
    fn name(&self) -> &'static str {
        "Kakuyomu"
    }

    fn site(&self) -> SiteId {
        SiteId::Kakuyomu
    }

    fn origin(&self) -> &'static str {
        ORIGIN
    }

    async fn decompose(
        &self,
        url: &Url,
        _ctx: &RequestContext,
    ) -> Result<Vec<EpisodeRef>, SourceError> {
        Ok(vec![EpisodeRef::untitled(url.as_str())])
    }

    async fn extract(&self, url: &Url, ctx: &RequestContext) -> Result<NovelRecord, SourceError> {
        let episode_id = Self::episode_id(url)
            .ok_or_else(|| SourceError::extraction(url.as_str(), "episode id"))?
            .to_string();

        let response = self
            .fetcher
            .get(&FetchRequest::new(url.as_str()), &ctx.cancel)
            .await?;
        let page = self.parse_episode(&response.body, url.as_str())?;

        Ok(NovelRecord {
            series_title_and_author: series_title_and_author(&page.work_title, &page.author),
            title: page.title,
            index_prefix: episode_id,
            content: page.content,
            series_title: page.work_title,
            url: url.to_string(),
            author: page.author,
            tags: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::http::testing::{FakeTransport, fetcher};
    use super::super::testing::{context, context_with_store, url};
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use std::sync::Arc;

    const EPISODE_URL: &str = "https://kakuyomu.jp/works/1177354054881234567/episodes/1177354054889876543";

    const EPISODE_HTML: &str = r#"<html><body>
        <div id="contentMain-header">
            <h2 id="contentMain-header-workTitle">ある冒険の記録</h2>
            <p id="contentMain-header-author">物書き太郎</p>
        </div>
        <p class="widget-episodeTitle js-vertical-composition-item">第1話 旅立ち</p>
        <div class="widget-episodeBody js-episode-body">
            <p id="p1">朝が来た。</p>
            <p id="p2" class="blank"><br></p>
            <p id="p3"><ruby><rb>勇者</rb><rp>（</rp><rt>ゆうしゃ</rt><rp>）</rp></ruby>は目を覚ました。</p>
        </div>
    </body></html>"#;

    fn adapter() -> (Arc<FakeTransport>, KakuyomuAdapter) {
        let transport = Arc::new(FakeTransport::new());
        let adapter = KakuyomuAdapter::new(fetcher(&transport));
        (transport, adapter)
    }

    #[tokio::test]
    async fn test_decompose_passes_through() {
        let (transport, adapter) = adapter();
        for page in ["https://kakuyomu.jp/works/1177354054881234567", EPISODE_URL] {
            let refs = adapter.decompose(&url(page), &context(false)).await.unwrap();
            assert_eq!(refs, vec![EpisodeRef::untitled(page)]);
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_extract_episode() {
        let (transport, adapter) = adapter();
        transport.html(EPISODE_URL, EPISODE_HTML);

        let record = adapter.extract(&url(EPISODE_URL), &context(false)).await.unwrap();

        assert_eq!(record.title, "第1話 旅立ち");
        assert_eq!(record.series_title, "ある冒険の記録");
        assert_eq!(record.author, "物書き太郎");
        assert_eq!(record.series_title_and_author, "ある冒険の記録 - 物書き太郎");
        assert_eq!(record.index_prefix, "1177354054889876543");
        assert_eq!(record.content, "朝が来た。\n\n勇者は目を覚ました。");
        assert_eq!(record.url, EPISODE_URL);
        assert_eq!(record.tags, None);
    }

    #[tokio::test]
    async fn test_extract_rejects_work_page() {
        let (transport, adapter) = adapter();
        let err = adapter
            .extract(
                &url("https://kakuyomu.jp/works/1177354054881234567"),
                &context(false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::ExtractionFailed { .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_extract_missing_body_fails() {
        let (transport, adapter) = adapter();
        transport.html(
            EPISODE_URL,
            r#"<h2 id="contentMain-header-workTitle">作品</h2>
               <p id="contentMain-header-author">作者</p>
               <p class="widget-episodeTitle">題</p>"#,
        );

        let err = adapter
            .extract(&url(EPISODE_URL), &context(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::ExtractionFailed { field, .. } if field == "episode body"));
    }

    #[tokio::test]
    async fn test_extract_sends_no_cookies() {
        let (transport, adapter) = adapter();
        transport.html(EPISODE_URL, EPISODE_HTML);
        let store = Arc::new(MemoryCredentialStore::with_cookie(SiteId::Kakuyomu, "session=1"));

        adapter
            .extract(&url(EPISODE_URL), &context_with_store(true, store))
            .await
            .unwrap();

        assert_eq!(transport.requests()[0].header_value("Cookie"), None);
    }
}
