// crates/quarry-server/src/search/searxng.rs
// SearXNG JSON API search provider

use crate::error::{ProviderError, QuarryError, Result};
use crate::http::SEARCH_TIMEOUT;
use crate::search::provider::SearchProvider;
use async_trait::async_trait;
use quarry_types::{SearchBatch, SearchHit, TimeRange};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const PROVIDER_NAME: &str = "searxng";

/// Image URLs fetched alongside each query
const MAX_IMAGES: usize = 4;

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "publishedDate")]
    published_date: Option<String>,
    #[serde(default)]
    pubdate: Option<String>,
    #[serde(default)]
    img_src: Option<String>,
}

fn to_hits(response: SearxResponse, max_results: usize) -> Vec<SearchHit> {
    response
        .results
        .into_iter()
        .filter_map(|r| {
            let url = r.url.filter(|u| !u.is_empty())?;
            Some(SearchHit {
                title: r.title,
                url,
                content: r.content,
                published_date: r.published_date.or(r.pubdate),
            })
        })
        .take(max_results)
        .collect()
}

fn to_images(response: SearxResponse) -> Vec<String> {
    response
        .results
        .into_iter()
        .filter_map(|r| r.img_src.filter(|s| !s.is_empty()))
        .take(MAX_IMAGES)
        .collect()
}

/// Search against a SearXNG instance with the JSON format enabled
pub struct SearxngProvider {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    images: bool,
}

impl SearxngProvider {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: SEARCH_TIMEOUT,
            images: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Also query the images category for each search
    pub fn with_images(mut self, images: bool) -> Self {
        self.images = images;
        self
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<SearxResponse> {
        let err = |e: ProviderError| QuarryError::provider(PROVIDER_NAME, e);

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(params)
            // SearXNG's bot detection rejects requests without these
            .header("X-Forwarded-For", "127.0.0.1")
            .header("X-Real-IP", "127.0.0.1")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| err(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(err(ProviderError::from_status(status.as_u16(), body)));
        }

        response
            .json::<SearxResponse>()
            .await
            .map_err(|e| err(ProviderError::Malformed(e.to_string())))
    }
}

#[async_trait]
impl SearchProvider for SearxngProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn search(
        &self,
        query: &str,
        time_range: Option<TimeRange>,
        max_results: usize,
    ) -> Result<SearchBatch> {
        let mut params = vec![("q", query), ("format", "json")];
        if let Some(range) = time_range {
            params.push(("time_range", range.as_str()));
        }

        let hits = to_hits(self.fetch(&params).await?, max_results);

        let images = if self.images {
            let mut image_params = params.clone();
            image_params.push(("categories", "images"));
            match self.fetch(&image_params).await {
                Ok(response) => to_images(response),
                Err(e) => {
                    warn!(error = %e, "Image search failed, continuing without images");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        debug!(hits = hits.len(), images = images.len(), "Search complete");
        Ok(SearchBatch { hits, images })
    }
}
