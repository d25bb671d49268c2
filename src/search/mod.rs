pub mod giphy;
pub mod searxng;

pub use giphy::GiphySearch;
pub use searxng::SearxngImageSearch;

use crate::error::{ReelError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Upper bound on results requested from any backend.
pub const MAX_RESULTS: usize = 10;

/// Smallest declared size kept on the first filtering pass.
pub const MIN_WIDTH: u32 = 400;
pub const MIN_HEIGHT: u32 = 300;

/// Domains whose images are watermarked, login-walled or hotlink-protected.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "pinterest.com",
    "pinimg.com",
    "facebook.com",
    "fbsbx.com",
    "instagram.com",
    "cdninstagram.com",
    "tiktok.com",
    "shutterstock.com",
    "gettyimages.com",
    "istockphoto.com",
    "alamy.com",
    "dreamstime.com",
    "123rf.com",
    "depositphotos.com",
];

/// One candidate returned by a media search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub thumb_url: String,
    /// Declared width; 0 when the backend did not say.
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait MediaSearcher: Send + Sync {
    /// Search for up to `count` results (capped at [`MAX_RESULTS`]).
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>>;
    /// Fetch the bytes behind a result URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
    fn name(&self) -> &'static str;
}

/// Whether `url`'s host is, or is a subdomain of, a blocked domain.
///
/// URLs without a host are treated as blocked.
pub fn is_blocked(url: &str, blocklist: &[String]) -> bool {
    let Some(host) = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return true;
    };

    blocklist.iter().any(|domain| {
        let domain = domain.to_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

/// Drop blocked domains, then results below the minimum declared size.
///
/// If the size filter leaves nothing, the blocklist-filtered list is used
/// as is.
pub fn filter_results(
    results: Vec<SearchResult>,
    blocklist: &[String],
    min_width: u32,
    min_height: u32,
) -> Vec<SearchResult> {
    let allowed: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| !is_blocked(&r.url, blocklist))
        .collect();

    let sized: Vec<SearchResult> = allowed
        .iter()
        .filter(|r| r.width >= min_width && r.height >= min_height)
        .cloned()
        .collect();

    if sized.is_empty() {
        debug!("No results pass the size filter, keeping {} unsized", allowed.len());
        allowed
    } else {
        sized
    }
}

/// The default blocklist as owned strings, extended with `extra`.
pub fn blocklist_with(extra: &[String]) -> Vec<String> {
    DEFAULT_BLOCKLIST
        .iter()
        .map(|d| d.to_string())
        .chain(extra.iter().cloned())
        .collect()
}

/// GET `url` and return its body, insisting on an `image/*` content type.
pub(crate) async fn download_image(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let response = client.get(url).timeout(timeout).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ReelError::from_status("image download", status, url));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(ReelError::MediaValidation(format!(
            "unexpected content type '{content_type}' from {url}"
        )));
    }

    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, width: u32, height: u32) -> SearchResult {
        SearchResult {
            title: String::new(),
            url: url.to_string(),
            thumb_url: String::new(),
            width,
            height,
        }
    }

    #[test]
    fn test_is_blocked() {
        let blocklist = blocklist_with(&[]);
        assert!(is_blocked("https://i.pinimg.com/x.jpg", &blocklist));
        assert!(is_blocked("https://www.Shutterstock.com/a.jpg", &blocklist));
        assert!(!is_blocked("https://upload.wikimedia.org/cat.jpg", &blocklist));
        assert!(!is_blocked("https://notpinterest.com/cat.jpg", &blocklist));
        assert!(is_blocked("not a url", &blocklist));
    }

    #[test]
    fn test_extra_blocklist() {
        let blocklist = blocklist_with(&["example.org".to_string()]);
        assert!(is_blocked("https://cdn.example.org/a.png", &blocklist));
    }

    #[test]
    fn test_filter_by_size() {
        let blocklist = blocklist_with(&[]);
        let results = vec![
            result("https://a.com/1.jpg", 200, 200),
            result("https://a.com/2.jpg", 800, 600),
            result("https://pinterest.com/3.jpg", 1920, 1080),
        ];
        let filtered = filter_results(results, &blocklist, MIN_WIDTH, MIN_HEIGHT);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "https://a.com/2.jpg");
    }

    #[test]
    fn test_filter_size_fallback() {
        let blocklist = blocklist_with(&[]);
        let results = vec![
            result("https://a.com/1.jpg", 0, 0),
            result("https://pinterest.com/2.jpg", 0, 0),
            result("https://a.com/3.jpg", 100, 80),
        ];
        let filtered = filter_results(results, &blocklist, MIN_WIDTH, MIN_HEIGHT);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| !r.url.contains("pinterest")));
    }
}
