//! Site credential storage.
//!
//! Adapters that need session-gated content read a `Cookie` header from a
//! [`CredentialStore`] and write refreshed `Set-Cookie` values back to it.
//! The store is passed in explicitly with each call, never held globally.
//!
//! [`CookieFileStore`] seeds itself from Netscape HTTP cookie files, commonly
//! exported by browser extensions.

use crate::error::CredentialError;
use crate::sources::SiteId;
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Capability for reading and refreshing stored site cookies.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the `Cookie` header value stored for a site, if any.
    async fn get_cookie(&self, site: SiteId) -> Option<String>;

    /// Merges raw `Set-Cookie` header values received from a site.
    async fn set_cookie(&self, site: SiteId, set_cookie_headers: &[String]);
}

/// Cookie jar holding one site's cookies, scoped to the site's URL.
#[derive(Debug)]
struct SiteJar {
    url: Url,
    jar: Jar,
}

/// In-memory credential store with one cookie jar per site.
///
/// `Set-Cookie` handling (expiry, `Max-Age`, domain and path scoping) is done
/// by the jar.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    jars: HashMap<SiteId, SiteJar>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        let jars = SiteId::ALL
            .into_iter()
            .filter_map(|site| {
                let url = Url::parse(site.cookie_url()).ok()?;
                Some((
                    site,
                    SiteJar {
                        url,
                        jar: Jar::default(),
                    },
                ))
            })
            .collect();
        Self { jars }
    }
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a raw `Cookie` header value for one site.
    pub fn with_cookie(site: SiteId, cookie_header: &str) -> Self {
        let store = Self::new();
        store.insert_header(site, cookie_header);
        store
    }

    /// Adds every `name=value` pair of a `Cookie` header for a site.
    pub fn insert_header(&self, site: SiteId, cookie_header: &str) {
        let Some(entry) = self.jars.get(&site) else {
            return;
        };
        for pair in cookie_header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=')
                && !name.trim().is_empty()
            {
                let cookie = format!("{}={}; Path=/", name.trim(), value.trim());
                entry.jar.add_cookie_str(&cookie, &entry.url);
            }
        }
    }

    /// Adds cookies read from a Netscape cookie file.
    fn add_netscape_cookies(&self, site: SiteId, cookies: &[NetscapeCookie], now: u64) -> usize {
        let Some(entry) = self.jars.get(&site) else {
            return 0;
        };

        let mut added = 0;
        for cookie in cookies {
            let host = cookie.domain.trim_start_matches('.');
            if host.is_empty() {
                tracing::warn!(domain = %cookie.domain, "skipping cookie with empty domain");
                continue;
            }
            let Ok(url) = Url::parse(&format!("https://{}/", host)) else {
                tracing::warn!(domain = %cookie.domain, "skipping cookie with invalid domain");
                continue;
            };

            let mut cookie_str = format!("{}={}", cookie.name, cookie.value);
            cookie_str.push_str(&format!("; Path={}", cookie.path));

            if cookie.include_subdomains {
                cookie_str.push_str(&format!("; Domain={}", host));
            }

            if cookie.secure {
                cookie_str.push_str("; Secure");
            }

            if cookie.http_only {
                cookie_str.push_str("; HttpOnly");
            }

            if let Some(expires) = cookie.expires_unix {
                if expires <= now {
                    continue;
                }
                cookie_str.push_str(&format!("; Max-Age={}", expires - now));
            }

            entry.jar.add_cookie_str(&cookie_str, &url);
            added += 1;
        }
        added
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_cookie(&self, site: SiteId) -> Option<String> {
        let entry = self.jars.get(&site)?;
        entry
            .jar
            .cookies(&entry.url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    async fn set_cookie(&self, site: SiteId, set_cookie_headers: &[String]) {
        let Some(entry) = self.jars.get(&site) else {
            return;
        };
        let values: Vec<HeaderValue> = set_cookie_headers
            .iter()
            .filter_map(|header| match HeaderValue::from_str(header) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%site, "ignoring malformed Set-Cookie header");
                    None
                }
            })
            .collect();
        entry.jar.set_cookies(&mut values.iter(), &entry.url);
    }
}

/// Credential store seeded from Netscape cookie files.
///
/// For each site, the most recently modified `*.txt` file under the cookie
/// directory whose name contains the site id (e.g. `pixiv-cookies.txt`) is
/// loaded. Refreshed cookies are kept in memory for the lifetime of the store.
#[derive(Debug, Default)]
pub struct CookieFileStore {
    inner: MemoryCredentialStore,
    sources: Vec<(SiteId, PathBuf)>,
}

impl CookieFileStore {
    /// Loads cookie files for all known sites from `dir`.
    ///
    /// A missing directory yields an empty store.
    pub fn load(dir: &Path) -> Result<Self, CredentialError> {
        let mut store = Self::default();
        if !dir.is_dir() {
            return Ok(store);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        for site in SiteId::ALL {
            let Some(path) = find_cookie_file(dir, &[site.as_str()])? else {
                continue;
            };
            let cookies = parse_netscape_cookie_file(&path)?;
            let added = store.inner.add_netscape_cookies(site, &cookies, now);
            tracing::debug!(site = site.as_str(), path = %path.display(), added, "loaded cookie file");
            store.sources.push((site, path));
        }

        Ok(store)
    }

    /// Returns the cookie file loaded for a site, if any.
    pub fn source_for(&self, site: SiteId) -> Option<&Path> {
        self.sources
            .iter()
            .find(|(s, _)| *s == site)
            .map(|(_, path)| path.as_path())
    }
}

#[async_trait]
impl CredentialStore for CookieFileStore {
    async fn get_cookie(&self, site: SiteId) -> Option<String> {
        self.inner.get_cookie(site).await
    }

    async fn set_cookie(&self, site: SiteId, set_cookie_headers: &[String]) {
        self.inner.set_cookie(site, set_cookie_headers).await
    }
}

/// Cookie entry parsed from a Netscape cookie file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NetscapeCookie {
    domain: String,
    include_subdomains: bool,
    path: String,
    secure: bool,
    expires_unix: Option<u64>,
    name: String,
    value: String,
    http_only: bool,
}

fn find_cookie_file(root: &Path, name_tokens: &[&str]) -> Result<Option<PathBuf>, std::io::Error> {
    let mut best: Option<(PathBuf, SystemTime)> = None;
    find_cookie_file_recursive(root, name_tokens, &mut best)?;
    Ok(best.map(|(path, _)| path))
}

fn find_cookie_file_recursive(
    dir: &Path,
    name_tokens: &[&str],
    best: &mut Option<(PathBuf, SystemTime)>,
) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            find_cookie_file_recursive(&path, name_tokens, best)?;
            continue;
        }

        let file_name = match path.file_name().and_then(OsStr::to_str) {
            Some(name) => name.to_ascii_lowercase(),
            None => continue,
        };

        if !file_name.ends_with(".txt") {
            continue;
        }

        if !name_tokens
            .iter()
            .all(|token| file_name.contains(&token.to_ascii_lowercase()))
        {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(UNIX_EPOCH);

        let should_replace = match best {
            Some((_, best_time)) => modified > *best_time,
            None => true,
        };

        if should_replace {
            *best = Some((path, modified));
        }
    }

    Ok(())
}

fn parse_netscape_cookie_file(path: &Path) -> Result<Vec<NetscapeCookie>, CredentialError> {
    let content = std::fs::read_to_string(path)?;
    let mut cookies = Vec::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let (http_only, line) = if let Some(stripped) = line.strip_prefix("#HttpOnly_") {
            (true, stripped)
        } else if line.starts_with('#') {
            continue;
        } else {
            (false, line)
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, subdomains, path, secure, expires_raw, name, value] = fields[..] else {
            return Err(CredentialError::InvalidLine(line.to_string()));
        };

        let expires_unix = expires_raw
            .parse::<u64>()
            .ok()
            .and_then(|ts| if ts == 0 { None } else { Some(ts) });

        cookies.push(NetscapeCookie {
            domain: domain.to_string(),
            include_subdomains: subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            expires_unix,
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        });
    }

    Ok(cookies)
}
