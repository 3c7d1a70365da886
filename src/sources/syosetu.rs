//! Syosetu (ncode.syosetu.com / novel18.syosetu.com) adapter.
//!
//! Series pages are expanded through the public novel API, which reports the
//! episode count; episode URLs are then synthesized without further requests.
//! Episode pages are parsed from HTML, supporting both the current
//! `p-novel__*` layout and the legacy one.

use super::html::{first_text, paragraph_text, text_after_label};
use super::{
    EpisodeRef, FetchRequest, Fetcher, NovelRecord, RequestContext, SiteAdapter, SiteId,
    series_title_and_author,
};
use crate::error::SourceError;
use crate::utils::{index_label, path_segments};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

const GENERAL_ORIGIN: &str = "https://ncode.syosetu.com";
const GENERAL_API: &str = "https://api.syosetu.com/novelapi/api/";
const ADULT_ORIGIN: &str = "https://novel18.syosetu.com";
const ADULT_API: &str = "https://api.syosetu.com/novel18api/api/";

/// `noveltype` value the API uses for short stories.
const SHORT_STORY: u8 = 2;

const AUTHOR_LABEL: &str = "作者：";

/// Per-novel entry of the API result (index 1; index 0 holds `allcount`).
#[derive(Debug, Deserialize)]
struct NovelStats {
    general_all_no: u32,
    #[serde(default)]
    noveltype: Option<u8>,
}

/// CSS selectors used for parsing.
struct Selectors {
    /// Episode title (new layout; work title on short stories).
    title_primary: Selector,
    /// Episode title (old layout).
    title_fallback: Selector,
    /// Short story title (old layout).
    oneshot_title_fallback: Selector,
    /// Link back to the series index.
    series_primary: Selector,
    series_fallback: Selector,
    /// Author profile links.
    author_links: Selector,
    /// Blocks containing an `作者：` label.
    author_blocks: Selector,
    /// Body text (new layout, excluding preface and afterword).
    content_primary: Selector,
    /// Body text (old layout).
    content_fallback: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            title_primary: Selector::parse(".p-novel__title").unwrap(),
            title_fallback: Selector::parse("p.novel_subtitle").unwrap(),
            oneshot_title_fallback: Selector::parse("p.novel_title").unwrap(),
            series_primary: Selector::parse(".c-announce-box .c-announce a:not([href*=\"mypage.syosetu.com\"])").unwrap(),
            series_fallback: Selector::parse(".contents1 a.margin_r20").unwrap(),
            author_links: Selector::parse(
                ".c-announce a[href*=\"mypage.syosetu.com\"], .p-novel__author a, .novel_writername a",
            )
            .unwrap(),
            author_blocks: Selector::parse(
                ".c-announce, .p-novel__author, .novel_writername, .contents1",
            )
            .unwrap(),
            content_primary: Selector::parse(
                ".p-novel__text.js-novel-text:not(.p-novel__text--preface):not(.p-novel__text--afterword)",
            )
            .unwrap(),
            content_fallback: Selector::parse("#novel_honbun").unwrap(),
            paragraph: Selector::parse("p").unwrap(),
        }
    }
}

/// Which page an extraction URL points at.
enum EpisodePage {
    /// `/{novel_id}/{order}/`
    Episode(u32),
    /// `/{novel_id}/` of a short story, whose text lives on the index page.
    ShortStory,
}

/// Syosetu adapter for one of the two Syosetu origins.
pub struct SyosetuAdapter {
    fetcher: Fetcher,
    origin: &'static str,
    api_base: &'static str,
    selectors: Selectors,
}

impl SyosetuAdapter {
    /// Adapter for ncode.syosetu.com (general audience).
    pub fn general(fetcher: Fetcher) -> Self {
        Self::with_endpoints(fetcher, GENERAL_ORIGIN, GENERAL_API)
    }

    /// Adapter for novel18.syosetu.com (18+ content).
    pub fn adult(fetcher: Fetcher) -> Self {
        Self::with_endpoints(fetcher, ADULT_ORIGIN, ADULT_API)
    }

    fn with_endpoints(fetcher: Fetcher, origin: &'static str, api_base: &'static str) -> Self {
        Self {
            fetcher,
            origin,
            api_base,
            selectors: Selectors::new(),
        }
    }

    fn api_url(&self, novel_id: &str) -> Result<Url, SourceError> {
        Url::parse_with_params(self.api_base, &[("ncode", novel_id), ("out", "json")])
            .map_err(|e| SourceError::remote_api(self.api_base, e.to_string()))
    }

    fn episode_url(&self, novel_id: &str, order: u32) -> String {
        format!("{}/{}/{}/", self.origin, novel_id, order)
    }

    /// Queries the novel API for the episode count and novel type.
    async fn fetch_stats(
        &self,
        novel_id: &str,
        ctx: &RequestContext,
    ) -> Result<NovelStats, SourceError> {
        let api_url = self.api_url(novel_id)?;
        let request = FetchRequest::new(api_url.as_str());
        let (payload, _) = self
            .fetcher
            .get_json::<JsonValue>(&request, &ctx.cancel)
            .await?;
        parse_stats(api_url.as_str(), payload)
    }

    /// Parses an episode page into a record.
    fn parse_episode(
        &self,
        html: &str,
        url: &Url,
        page: &EpisodePage,
    ) -> Result<NovelRecord, SourceError> {
        let doc = Html::parse_document(html);
        let s = &self.selectors;

        let title = match page {
            EpisodePage::Episode(_) => first_text(&doc, &[&s.title_primary, &s.title_fallback]),
            EpisodePage::ShortStory => {
                first_text(&doc, &[&s.title_primary, &s.oneshot_title_fallback])
            }
        }
        .ok_or_else(|| SourceError::extraction(url.as_str(), "episode title"))?;

        let series_title = match page {
            EpisodePage::Episode(_) => first_text(&doc, &[&s.series_primary, &s.series_fallback])
                .ok_or_else(|| SourceError::extraction(url.as_str(), "series title"))?,
            EpisodePage::ShortStory => title.clone(),
        };

        let author = self
            .extract_author(&doc)
            .ok_or_else(|| SourceError::extraction(url.as_str(), "author"))?;

        let body = doc
            .select(&s.content_primary)
            .next()
            .or_else(|| doc.select(&s.content_fallback).next())
            .ok_or_else(|| SourceError::extraction(url.as_str(), "chapter content"))?;
        let content = paragraph_text(body, &s.paragraph);
        if content.trim().is_empty() {
            return Err(SourceError::extraction(url.as_str(), "chapter content"));
        }

        let position = match page {
            EpisodePage::Episode(order) => *order,
            EpisodePage::ShortStory => 1,
        };

        Ok(NovelRecord {
            series_title_and_author: series_title_and_author(&series_title, &author),
            title,
            index_prefix: index_label(position),
            content,
            series_title,
            url: url.to_string(),
            author,
            tags: None,
        })
    }

    fn extract_author(&self, doc: &Html) -> Option<String> {
        if let Some(author) = first_text(doc, &[&self.selectors.author_links]) {
            return Some(author);
        }

        doc.select(&self.selectors.author_blocks)
            .find_map(|block| text_after_label(&block.text().collect::<String>(), AUTHOR_LABEL))
    }
}

fn parse_stats(api_url: &str, payload: JsonValue) -> Result<NovelStats, SourceError> {
    let entry = match payload {
        JsonValue::Array(mut items) if items.len() > 1 => items.swap_remove(1),
        JsonValue::Array(_) => {
            return Err(SourceError::remote_api(api_url, "no novel found for this ncode"));
        }
        _ => return Err(SourceError::remote_api(api_url, "expected a JSON array")),
    };

    serde_json::from_value(entry)
        .map_err(|e| SourceError::remote_api(api_url, format!("missing general_all_no: {}", e)))
}

#[async_trait]
impl SiteAdapter for SyosetuAdapter {
    fn name(&self) -> &'static str {
        "Syosetu"
    }

    fn site(&self) -> SiteId {
        SiteId::Syosetu
    }

    fn origin(&self) -> &'static str {
        self.origin
    }

    async fn decompose(
        &self,
        url: &Url,
        ctx: &RequestContext,
    ) -> Result<Vec<EpisodeRef>, SourceError> {
        match path_segments(url).as_slice() {
            [novel_id] => {
                let stats = self.fetch_stats(novel_id, ctx).await?;
                if stats.noveltype == Some(SHORT_STORY) {
                    return Ok(vec![EpisodeRef::untitled(format!(
                        "{}/{}/",
                        self.origin, novel_id
                    ))]);
                }

                Ok((1..=stats.general_all_no)
                    .map(|order| EpisodeRef::untitled(self.episode_url(novel_id, order)))
                    .collect())
            }
            [_, _] => Ok(vec![EpisodeRef::untitled(url.as_str())]),
            _ => Err(SourceError::InvalidSyosetsuUrl(url.to_string())),
        }
    }

    async fn extract(&self, url: &Url, ctx: &RequestContext) -> Result<NovelRecord, SourceError> {
        let page = match path_segments(url).as_slice() {
            [_] => EpisodePage::ShortStory,
            [_, order] => order
                .parse::<u32>()
                .map(EpisodePage::Episode)
                .map_err(|_| SourceError::InvalidSyosetsuUrl(url.to_string()))?,
            _ => return Err(SourceError::InvalidSyosetsuUrl(url.to_string())),
        };

        // The age gate is answered with a fixed cookie; no stored credentials needed.
        let request = FetchRequest::new(url.as_str()).header("Cookie", "over18=yes");
        let response = self.fetcher.get(&request, &ctx.cancel).await?;
        self.parse_episode(&response.body, url, &page)
    }
}

#[cfg(test)]
mod tests {
    use super::super::http::testing::{FakeTransport, fetcher};
    use super::super::testing::{context, url};
    use super::*;
    use std::sync::Arc;

    const API: &str = "https://api.syosetu.com/novelapi/api/?ncode=n1234ab&out=json";

    const EPISODE_HTML: &str = r#"
<html><body>
<div class="c-announce-box">
  <div class="c-announce">
    <a href="/n1234ab/">異世界の<ruby>図書館<rt>としょかん</rt></ruby></a>
    <span>作者：</span><a href="https://mypage.syosetu.com/12345/">山田太郎</a>
  </div>
</div>
<article class="p-novel">
  <div class="p-novel__number">7/120</div>
  <h1 class="p-novel__title p-novel__title--rensai">第七話　出発</h1>
  <div class="p-novel__body">
    <div class="js-novel-text p-novel__text p-novel__text--preface"><p>前書きです</p></div>
    <div class="js-novel-text p-novel__text">
      <p id="L1">朝が来た。</p>
      <p id="L2"><br></p>
      <p id="L3"><ruby>旅<rp>(</rp><rt>たび</rt><rp>)</rp></ruby>が始まる。</p>
    </div>
    <div class="js-novel-text p-novel__text p-novel__text--afterword"><p>後書きです</p></div>
  </div>
</article>
</body></html>"#;

    const LEGACY_HTML: &str = r#"
<html><body>
<div class="contents1">
  <a href="/n1234ab/" class="margin_r20">旧作品名</a>
  作者：<a href="https://mypage.syosetu.com/999/">鈴木</a>
</div>
<p class="novel_subtitle">第一話</p>
<div id="novel_honbun" class="novel_view">
  <p id="L1">一行目</p>
  <p id="L2">二行目</p>
</div>
</body></html>"#;

    const SHORT_STORY_HTML: &str = r#"
<html><body>
<article class="p-novel">
  <h1 class="p-novel__title">短編のタイトル</h1>
  <div class="p-novel__author">作者：<a href="https://mypage.syosetu.com/1/">佐藤</a></div>
  <div class="p-novel__body">
    <div class="js-novel-text p-novel__text"><p>これは短編です。</p></div>
  </div>
</article>
</body></html>"#;

    fn adapter() -> (Arc<FakeTransport>, SyosetuAdapter) {
        let transport = Arc::new(FakeTransport::new());
        let adapter = SyosetuAdapter::general(fetcher(&transport));
        (transport, adapter)
    }

    #[tokio::test]
    async fn test_series_expands_from_api_count() {
        let (transport, adapter) = adapter();
        transport.json(API, r#"[{"allcount":1},{"title":"作品","general_all_no":3,"noveltype":1}]"#);

        let refs = adapter
            .decompose(&url("https://ncode.syosetu.com/n1234ab"), &context(false))
            .await
            .unwrap();

        assert_eq!(
            refs,
            vec![
                EpisodeRef::untitled("https://ncode.syosetu.com/n1234ab/1/"),
                EpisodeRef::untitled("https://ncode.syosetu.com/n1234ab/2/"),
                EpisodeRef::untitled("https://ncode.syosetu.com/n1234ab/3/"),
            ]
        );
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_series_with_trailing_slash() {
        let (transport, adapter) = adapter();
        transport.json(API, r#"[{"allcount":1},{"general_all_no":1}]"#);

        let refs = adapter
            .decompose(&url("https://ncode.syosetu.com/n1234ab/"), &context(false))
            .await
            .unwrap();
        assert_eq!(refs, vec![EpisodeRef::untitled("https://ncode.syosetu.com/n1234ab/1/")]);
    }

    #[tokio::test]
    async fn test_short_story_keeps_index_url() {
        let (transport, adapter) = adapter();
        transport.json(API, r#"[{"allcount":1},{"general_all_no":1,"noveltype":2}]"#);

        let refs = adapter
            .decompose(&url("https://ncode.syosetu.com/n1234ab"), &context(false))
            .await
            .unwrap();
        assert_eq!(refs, vec![EpisodeRef::untitled("https://ncode.syosetu.com/n1234ab/")]);
    }

    #[tokio::test]
    async fn test_episode_url_is_returned_as_is() {
        let (transport, adapter) = adapter();

        let refs = adapter
            .decompose(&url("https://ncode.syosetu.com/n1234ab/7/"), &context(false))
            .await
            .unwrap();

        assert_eq!(refs, vec![EpisodeRef::untitled("https://ncode.syosetu.com/n1234ab/7/")]);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_deep_paths_are_rejected() {
        let (_, adapter) = adapter();
        for bad in [
            "https://ncode.syosetu.com/n1234ab/7/extra/",
            "https://ncode.syosetu.com/",
        ] {
            let err = adapter.decompose(&url(bad), &context(false)).await.unwrap_err();
            assert!(matches!(err, SourceError::InvalidSyosetsuUrl(_)), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_empty_api_result_is_remote_error() {
        let (transport, adapter) = adapter();
        transport.json(API, r#"[{"allcount":0}]"#);

        let err = adapter
            .decompose(&url("https://ncode.syosetu.com/n1234ab"), &context(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RemoteApi { .. }));
    }

    #[tokio::test]
    async fn test_missing_count_is_remote_error() {
        let (transport, adapter) = adapter();
        transport.json(API, r#"[{"allcount":1},{"title":"作品"}]"#);

        let err = adapter
            .decompose(&url("https://ncode.syosetu.com/n1234ab"), &context(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RemoteApi { .. }));
    }

    #[tokio::test]
    async fn test_adult_origin_uses_adult_api() {
        let transport = Arc::new(FakeTransport::new());
        let adapter = SyosetuAdapter::adult(fetcher(&transport));
        transport.json(
            "https://api.syosetu.com/novel18api/api/?ncode=n9999zz&out=json",
            r#"[{"allcount":1},{"general_all_no":2}]"#,
        );

        let refs = adapter
            .decompose(&url("https://novel18.syosetu.com/n9999zz"), &context(false))
            .await
            .unwrap();
        assert_eq!(refs[1].url, "https://novel18.syosetu.com/n9999zz/2/");
    }

    #[tokio::test]
    async fn test_extract_current_layout() {
        let (transport, adapter) = adapter();
        let page = "https://ncode.syosetu.com/n1234ab/7/";
        transport.html(page, EPISODE_HTML);

        let record = adapter.extract(&url(page), &context(false)).await.unwrap();

        assert_eq!(record.title, "第七話　出発");
        assert_eq!(record.series_title, "異世界の図書館");
        assert_eq!(record.author, "山田太郎");
        assert_eq!(record.series_title_and_author, "異世界の図書館 - 山田太郎");
        assert_eq!(record.index_prefix, "0007");
        assert_eq!(record.content, "朝が来た。\n\n旅が始まる。");
        assert_eq!(record.url, page);
        assert_eq!(record.tags, None);

        let requests = transport.requests();
        assert_eq!(requests[0].header_value("Cookie"), Some("over18=yes"));
    }

    #[tokio::test]
    async fn test_extract_legacy_layout() {
        let (transport, adapter) = adapter();
        let page = "https://ncode.syosetu.com/n1234ab/1/";
        transport.html(page, LEGACY_HTML);

        let record = adapter.extract(&url(page), &context(false)).await.unwrap();

        assert_eq!(record.title, "第一話");
        assert_eq!(record.series_title, "旧作品名");
        assert_eq!(record.author, "鈴木");
        assert_eq!(record.content, "一行目\n二行目");
    }

    #[tokio::test]
    async fn test_extract_short_story() {
        let (transport, adapter) = adapter();
        let page = "https://ncode.syosetu.com/n1234ab/";
        transport.html(page, SHORT_STORY_HTML);

        let record = adapter.extract(&url(page), &context(false)).await.unwrap();

        assert_eq!(record.title, "短編のタイトル");
        assert_eq!(record.series_title, "短編のタイトル");
        assert_eq!(record.author, "佐藤");
        assert_eq!(record.index_prefix, "0001");
        assert_eq!(record.content, "これは短編です。");
    }

    #[tokio::test]
    async fn test_missing_body_fails_extraction() {
        let (transport, adapter) = adapter();
        let page = "https://ncode.syosetu.com/n1234ab/2/";
        transport.html(
            page,
            r#"<div class="c-announce-box"><div class="c-announce"><a href="/n1234ab/">作品</a><a href="https://mypage.syosetu.com/1/">作者</a></div></div><h1 class="p-novel__title">第二話</h1>"#,
        );

        let err = adapter.extract(&url(page), &context(false)).await.unwrap_err();
        assert!(matches!(err, SourceError::ExtractionFailed { field, .. } if field == "chapter content"));
    }

    #[tokio::test]
    async fn test_non_numeric_episode_is_rejected() {
        let (transport, adapter) = adapter();
        let err = adapter
            .extract(&url("https://ncode.syosetu.com/n1234ab/abc/"), &context(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidSyosetsuUrl(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_stored_cookies_are_never_sent() {
        use crate::credentials::MemoryCredentialStore;
        let (transport, adapter) = adapter();
        let page = "https://ncode.syosetu.com/n1234ab/7/";
        transport.html(page, EPISODE_HTML);
        let store = Arc::new(MemoryCredentialStore::with_cookie(SiteId::Syosetu, "session=secret"));

        adapter
            .extract(&url(page), &super::super::testing::context_with_store(true, store))
            .await
            .unwrap();

        assert_eq!(transport.requests()[0].header_value("Cookie"), Some("over18=yes"));
    }
}
