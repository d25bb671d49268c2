use crate::error::{ReelError, Result};
use crate::search::{download_image, MediaSearcher, SearchResult, MAX_RESULTS};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Giphy API endpoint.
const GIPHY_API_URL: &str = "https://api.giphy.com";

/// Animated GIF search through the Giphy API.
pub struct GiphySearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    rating: String,
    search_timeout: Duration,
    download_timeout: Duration,
}

impl GiphySearch {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GIPHY_API_URL.to_string(),
            rating: "pg-13".to_string(),
            search_timeout: Duration::from_secs(15),
            download_timeout: Duration::from_secs(30),
        }
    }

    /// Point at a different host (used for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = rating.into();
        self
    }

    pub fn with_timeouts(mut self, search: Duration, download: Duration) -> Self {
        self.search_timeout = search;
        self.download_timeout = download;
        self
    }
}

#[async_trait]
impl MediaSearcher for GiphySearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let limit = count.clamp(1, MAX_RESULTS).to_string();
        let url = format!("{}/v1/gifs/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("q", query),
                ("limit", limit.as_str()),
                ("rating", self.rating.as_str()),
                ("lang", "en"),
            ])
            .timeout(self.search_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReelError::from_status("Giphy", status, &body));
        }

        let parsed: GiphyResponse = response.json().await?;
        let results: Vec<SearchResult> = parsed
            .data
            .into_iter()
            .filter(|gif| !gif.images.original.url.is_empty())
            .map(|gif| SearchResult {
                title: gif.title,
                width: gif.images.original.width.parse().unwrap_or(0),
                height: gif.images.original.height.parse().unwrap_or(0),
                thumb_url: gif
                    .images
                    .fixed_width_small
                    .map(|r| r.url)
                    .unwrap_or_default(),
                url: gif.images.original.url,
            })
            .collect();

        debug!("Giphy '{}': {} results", query, results.len());
        Ok(results)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        download_image(&self.client, url, self.download_timeout).await
    }

    fn name(&self) -> &'static str {
        "Giphy"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct GiphyResponse {
    #[serde(default)]
    data: Vec<GiphyGif>,
}

#[derive(Debug, Deserialize)]
struct GiphyGif {
    #[serde(default)]
    title: String,
    images: GiphyImages,
}

#[derive(Debug, Deserialize)]
struct GiphyImages {
    original: GiphyRendition,
    #[serde(default)]
    fixed_width_small: Option<GiphyRendition>,
}

#[derive(Debug, Deserialize)]
struct GiphyRendition {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: String,
    #[serde(default)]
    height: String,
}
