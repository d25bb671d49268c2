use crate::error::{ReelError, Result};
use crate::search::{
    blocklist_with, download_image, filter_results, MediaSearcher, SearchResult, MAX_RESULTS,
    MIN_HEIGHT, MIN_WIDTH,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Still-image search through a SearXNG instance's JSON API.
pub struct SearxngImageSearch {
    client: reqwest::Client,
    base_url: String,
    blocklist: Vec<String>,
    search_timeout: Duration,
    download_timeout: Duration,
}

impl SearxngImageSearch {
    /// Create a client for the instance at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blocklist: blocklist_with(&[]),
            search_timeout: Duration::from_secs(15),
            download_timeout: Duration::from_secs(30),
        }
    }

    /// Block these domains in addition to the defaults.
    pub fn with_blocklist(mut self, extra: &[String]) -> Self {
        self.blocklist = blocklist_with(extra);
        self
    }

    pub fn with_timeouts(mut self, search: Duration, download: Duration) -> Self {
        self.search_timeout = search;
        self.download_timeout = download;
        self
    }

    fn to_result(raw: SearxngResult) -> Option<SearchResult> {
        let url = raw.img_src.filter(|s| !s.is_empty())?;
        let url = if url.starts_with("//") {
            format!("https:{url}")
        } else {
            url
        };
        let (width, height) = raw
            .resolution
            .as_deref()
            .and_then(parse_resolution)
            .unwrap_or((0, 0));

        Some(SearchResult {
            title: raw.title,
            url,
            thumb_url: raw.thumbnail_src.unwrap_or_default(),
            width,
            height,
        })
    }
}

/// Parse a declared size such as `1920x1080`, `1920 x 1080` or `1920×1080`.
fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let normalised = s.replace('×', "x").to_lowercase();
    let (w, h) = normalised.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

#[async_trait]
impl MediaSearcher for SearxngImageSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let count = count.clamp(1, MAX_RESULTS);
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("categories", "images"),
                ("safesearch", "1"),
            ])
            .timeout(self.search_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReelError::from_status("SearXNG", status, &body));
        }

        let parsed: SearxngResponse = response.json().await?;
        let raw_count = parsed.results.len();
        let results: Vec<SearchResult> = parsed
            .results
            .into_iter()
            .filter_map(Self::to_result)
            .collect();

        let mut filtered = filter_results(results, &self.blocklist, MIN_WIDTH, MIN_HEIGHT);
        filtered.truncate(count);

        debug!(
            "SearXNG '{}': {} raw, {} usable",
            query,
            raw_count,
            filtered.len()
        );

        Ok(filtered)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        download_image(&self.client, url, self.download_timeout).await
    }

    fn name(&self) -> &'static str {
        "SearXNG"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    img_src: Option<String>,
    #[serde(default)]
    thumbnail_src: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
}
