// crates/quarry-server/src/web/state.rs
// Shared application state and its wiring from configuration

use std::sync::Arc;

use crate::config::Config;
use crate::error::{QuarryError, Result};
use crate::http::create_shared_client;
use crate::llm::{Agents, LlmClient, OpenAiCompatProvider};
use crate::orchestrator::Orchestrator;
use crate::resilience::{BreakerPair, BreakerSnapshot, CircuitBreaker};
use crate::search::{SearchAggregator, SearchClient, SearxngProvider};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Answers chat requests
    pub orchestrator: Arc<Orchestrator>,

    /// Every breaker in the process, for health reporting
    pub breakers: Vec<Arc<CircuitBreaker>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, breakers: Vec<Arc<CircuitBreaker>>) -> Self {
        Self { orchestrator, breakers }
    }

    /// Build the provider stack: one HTTP client, an LLM breaker pair,
    /// and a search breaker, all shared by every request
    pub fn from_config(config: &Config) -> Result<Self> {
        let validation = config.env.validate();
        if !validation.is_valid() {
            return Err(QuarryError::Config(validation.report()));
        }
        for warning in &validation.warnings {
            tracing::warn!("{}", warning);
        }

        let searxng_url = config
            .env
            .searxng_url
            .clone()
            .ok_or_else(|| QuarryError::Config("SEARXNG_BASE_URL is not set".into()))?;

        let resilience = config.resilience();
        let http = create_shared_client();

        let llm_breakers = BreakerPair::new(
            "llm",
            resilience.streaming_breaker(),
            resilience.completion_breaker(),
        );
        let search_breaker = Arc::new(CircuitBreaker::new("search", resilience.completion_breaker()));

        let llm = OpenAiCompatProvider::from_config(http.clone(), &config.env)
            .with_request_timeout(resilience.llm_timeout())
            .with_idle_timeout(resilience.stream_idle_timeout())
            .with_stream_max(resilience.stream_max());
        let client = LlmClient::new(
            Arc::new(llm),
            &llm_breakers,
            resilience.full_call_policy(),
            resilience.connection_policy(),
        );
        let agents = Agents::new(client, config.reasoning_model(), config.fast_model());

        let search = SearchClient::new(
            Arc::new(SearxngProvider::new(http, searxng_url).with_timeout(resilience.search_timeout())),
            search_breaker.clone(),
            resilience.full_call_policy(),
        );

        let orchestrator = Orchestrator::new(agents, SearchAggregator::new(search))
            .with_pro_mode(config.env.pro_mode);

        let breakers = vec![
            llm_breakers.streaming.clone(),
            llm_breakers.completion.clone(),
            search_breaker,
        ];
        Ok(Self::new(Arc::new(orchestrator), breakers))
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.iter().map(|b| b.snapshot()).collect()
    }
}
