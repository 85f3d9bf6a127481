// crates/quarry-server/src/search/provider.rs
// Search provider abstraction and its resilient wrapper

use crate::error::Result;
use crate::resilience::{CircuitBreaker, Guard, RetryPolicy};
use async_trait::async_trait;
use quarry_types::{SearchBatch, TimeRange};
use std::sync::Arc;

/// Network-level search collaborator. One attempt per call.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        time_range: Option<TimeRange>,
        max_results: usize,
    ) -> Result<SearchBatch>;
}

/// Search calls behind the search breaker and the full-call retry policy
#[derive(Clone)]
pub struct SearchClient {
    provider: Arc<dyn SearchProvider>,
    guard: Guard,
}

impl SearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        let name = provider.name().to_string();
        Self {
            provider,
            guard: Guard::new(name, breaker, policy),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.guard.breaker()
    }

    pub async fn search(
        &self,
        query: &str,
        time_range: Option<TimeRange>,
        max_results: usize,
    ) -> Result<SearchBatch> {
        self.guard
            .call(self.provider.name(), || {
                self.provider.search(query, time_range, max_results)
            })
            .await
    }
}
