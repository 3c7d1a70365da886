//! URL helpers shared by the pipelines and adapters.

use crate::error::SourceError;
use url::Url;

/// An input token together with its parsed form.
///
/// The raw text is kept so passthrough can hand back exactly what the
/// caller supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputUrl {
    pub raw: String,
    pub url: Url,
}

impl InputUrl {
    /// Parses a token as an absolute URL.
    pub fn parse(token: &str) -> Result<Self, SourceError> {
        let url = Url::parse(token).map_err(|e| SourceError::InvalidUrl {
            token: token.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: token.to_string(),
            url,
        })
    }
}

/// Normalized origin used as the routing key: scheme and host, plus the port
/// when it is not the scheme's default.
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Non-empty path segments of a URL.
pub fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Zero-padded position label, e.g. `7` → `"0007"`.
pub fn index_label(position: u32) -> String {
    format!("{:04}", position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_url() {
        let input = InputUrl::parse("https://Example.com").unwrap();
        assert_eq!(input.raw, "https://Example.com");
        assert_eq!(input.url.as_str(), "https://example.com/");

        assert!(InputUrl::parse("mailto:someone@example.com").is_ok());
        assert!(matches!(
            InputUrl::parse("ncode.syosetu.com/n1234ab"),
            Err(SourceError::InvalidUrl { token, .. }) if token == "ncode.syosetu.com/n1234ab"
        ));
    }

    #[test]
    fn test_origin_key() {
        let url = Url::parse("https://www.pixiv.net/novel/show.php?id=1").unwrap();
        assert_eq!(origin_key(&url), "https://www.pixiv.net");

        let url = Url::parse("HTTPS://Kakuyomu.JP:443/works/1").unwrap();
        assert_eq!(origin_key(&url), "https://kakuyomu.jp");

        let url = Url::parse("http://kakuyomu.jp:8080/").unwrap();
        assert_eq!(origin_key(&url), "http://kakuyomu.jp:8080");
    }

    #[test]
    fn test_path_segments() {
        let url = Url::parse("https://ncode.syosetu.com/n1234ab/7/").unwrap();
        assert_eq!(path_segments(&url), vec!["n1234ab", "7"]);

        let url = Url::parse("https://ncode.syosetu.com//n1234ab").unwrap();
        assert_eq!(path_segments(&url), vec!["n1234ab"]);

        let url = Url::parse("https://ncode.syosetu.com/").unwrap();
        assert!(path_segments(&url).is_empty());
    }

    #[test]
    fn test_index_label() {
        assert_eq!(index_label(7), "0007");
        assert_eq!(index_label(12345), "12345");
    }
}
