// crates/quarry-server/src/web/mod.rs
// HTTP surface: health and the SSE chat endpoint

pub mod chat;
pub mod state;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::web::state::AppState;

/// Create the web server router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat::chat_stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "quarry",
        "version": env!("CARGO_PKG_VERSION"),
        "pro_mode": state.orchestrator.pro_enabled(),
        "breakers": state.breaker_snapshots(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::provider::{ChunkStream, CompletionRequest, LlmProvider};
    use crate::llm::{Agents, LlmClient, StreamChunk};
    use crate::orchestrator::Orchestrator;
    use crate::resilience::{BreakerConfig, BreakerPair, CircuitBreaker, RetryPolicy};
    use crate::search::{SearchAggregator, SearchClient, SearchProvider};
    use async_trait::async_trait;
    use quarry_types::{SearchBatch, SearchHit, TimeRange};
    use std::sync::Arc;

    struct Llm;

    #[async_trait]
    impl LlmProvider for Llm {
        fn name(&self) -> &str {
            "llm"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok(r#"{"related_questions": ["a", "b", "c"]}"#.into())
        }

        async fn stream(&self, _request: &CompletionRequest) -> Result<ChunkStream> {
            Ok(Box::pin(futures::stream::iter(vec![
                Ok(StreamChunk::Delta("Hello".into())),
                Ok(StreamChunk::Done),
            ])))
        }
    }

    struct Search;

    #[async_trait]
    impl SearchProvider for Search {
        fn name(&self) -> &str {
            "search"
        }

        async fn search(&self, _: &str, _: Option<TimeRange>, _: usize) -> Result<SearchBatch> {
            Ok(SearchBatch {
                hits: vec![SearchHit::new("T", "https://t.test", "c")],
                images: vec![],
            })
        }
    }

    fn state() -> AppState {
        let pair = BreakerPair::with_defaults("llm");
        let agents = Agents::new(LlmClient::with_defaults(Arc::new(Llm), &pair), "big", "small");
        let breaker = Arc::new(CircuitBreaker::new("search", BreakerConfig::completion()));
        let search = SearchClient::new(Arc::new(Search), breaker.clone(), RetryPolicy::full_call());
        let orchestrator = Orchestrator::new(agents, SearchAggregator::new(search)).with_pro_mode(false);
        AppState::new(
            Arc::new(orchestrator),
            vec![pair.streaming.clone(), pair.completion.clone(), breaker],
        )
    }

    async fn serve() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_reports_breakers() {
        let base = serve().await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pro_mode"], false);
        let names: Vec<&str> = body["breakers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["llm-streaming", "llm-completion", "search"]);
        assert_eq!(body["breakers"][0]["state"], "CLOSED");
    }

    #[tokio::test]
    async fn test_chat_rejects_invalid_request() {
        let base = serve().await;
        let response = reqwest::Client::new()
            .post(format!("{}/chat", base))
            .json(&serde_json::json!({ "query": "  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_chat_streams_sse_events() {
        let base = serve().await;
        let body = reqwest::Client::new()
            .post(format!("{}/chat", base))
            .json(&serde_json::json!({ "query": "hello" }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let kinds: Vec<&str> = body
            .lines()
            .filter_map(|l| l.strip_prefix("event:"))
            .map(str::trim)
            .collect();
        assert_eq!(kinds.first(), Some(&"begin-stream"));
        assert_eq!(kinds.last(), Some(&"stream-end"));
        assert!(kinds.contains(&"text-chunk"));
        assert!(body.contains(r#"{"text":"Hello"}"#));
    }
}
