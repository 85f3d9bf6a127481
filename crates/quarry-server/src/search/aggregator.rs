// crates/quarry-server/src/search/aggregator.rs
// Concurrent multi-query search with fair interleaving and URL dedup

use crate::search::provider::SearchClient;
use futures::future::join_all;
use quarry_types::{ChatRequest, SearchBatch, SearchHit, TimeRange};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Search settings shared by every query of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub time_range: Option<TimeRange>,
    pub max_results: usize,
    /// `YYYY-MM-DD`, appended as `after:` to every query
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, appended as `before:` to every query
    pub end_date: Option<String>,
}

impl SearchOptions {
    pub fn from_request(request: &ChatRequest) -> Self {
        Self {
            time_range: request.time_range,
            max_results: request.max_results,
            start_date: request.start_date.clone(),
            end_date: request.end_date.clone(),
        }
    }

    /// Append date-range operators to a query
    pub fn apply_date_range(&self, query: &str) -> String {
        let mut out = query.to_string();
        if let Some(start) = &self.start_date {
            out.push_str(" after:");
            out.push_str(start);
        }
        if let Some(end) = &self.end_date {
            out.push_str(" before:");
            out.push_str(end);
        }
        out
    }
}

/// Round-robin merge: first hit of each list in list order, then the
/// second of each, and so on. Shorter lists simply drop out.
pub fn interleave(lists: Vec<Vec<SearchHit>>) -> Vec<SearchHit> {
    let total = lists.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();

    while out.len() < total {
        for it in iters.iter_mut() {
            if let Some(hit) = it.next() {
                out.push(hit);
            }
        }
    }
    out
}

/// Keep the first hit for each URL, preserving order
pub fn dedup_by_url(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter().filter(|h| seen.insert(h.url.clone())).collect()
}

/// Keep the first occurrence of each image URL, preserving order
pub fn dedup_images(images: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    images.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Fans a step's queries out to the search provider and merges the results
#[derive(Clone)]
pub struct SearchAggregator {
    client: SearchClient,
}

impl SearchAggregator {
    pub fn new(client: SearchClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SearchClient {
        &self.client
    }

    /// Run all queries concurrently and merge them.
    ///
    /// A failed query contributes nothing; it never fails the whole set.
    pub async fn gather(&self, queries: &[String], options: &SearchOptions) -> SearchBatch {
        let searches = queries.iter().map(|q| {
            let query = options.apply_date_range(q);
            async move {
                match self
                    .client
                    .search(&query, options.time_range, options.max_results)
                    .await
                {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(query = %query, error = %e, "Search query failed, continuing without it");
                        SearchBatch::default()
                    }
                }
            }
        });
        let batches = join_all(searches).await;

        let mut hit_lists = Vec::with_capacity(batches.len());
        let mut images = Vec::new();
        for batch in batches {
            hit_lists.push(batch.hits);
            images.extend(batch.images);
        }

        let hits = dedup_by_url(interleave(hit_lists));
        let images = dedup_images(images);
        debug!(queries = queries.len(), hits = hits.len(), images = images.len(), "Search aggregated");
        SearchBatch { hits, images }
    }
}
