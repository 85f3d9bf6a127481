// crates/quarry-server/src/llm/provider.rs
// LLM provider abstraction layer

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a call is for. Selects the model and labels logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Final answer synthesis
    Answer,
    /// Query decomposition into plan steps
    Planning,
    /// Search queries for one plan step
    SearchQuery,
    /// Search terms for the single-shot path
    SearchTerms,
    /// Follow-up query rewrite
    Rephrase,
    /// Related follow-up questions
    Related,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Planning => "planning",
            Self::SearchQuery => "search_query",
            Self::SearchTerms => "search_terms",
            Self::Rephrase => "rephrase",
            Self::Related => "related",
        }
    }

    /// Roles that need the stronger model
    pub fn uses_reasoning_model(&self) -> bool {
        matches!(self, Self::Answer | Self::Planning)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested output shape
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    /// Any JSON object; the schema travels in the system prompt
    JsonObject,
    /// Provider-enforced JSON schema
    JsonSchema {
        name: String,
        schema: serde_json::Value,
    },
}

/// One chat completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub role: AgentRole,
    pub model: String,
    pub system: String,
    pub user: String,
    /// Threaded through to the provider as the end-user identifier
    pub session_id: String,
    pub format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(
        role: AgentRole,
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            role,
            model: model.into(),
            system: system.into(),
            user: user.into(),
            session_id: session_id.into(),
            format: ResponseFormat::Text,
        }
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }
}

/// Item of a raw provider stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Delta(String),
    /// Explicit end-of-response marker from the provider
    Done,
}

/// Raw stream as returned by a provider
pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// Network-level LLM collaborator.
///
/// Implementations perform one attempt and classify failures into
/// `ProviderError` kinds. Retry and circuit breaking live in `LlmClient`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name used in errors and logs
    fn name(&self) -> &str;

    /// Whether `ResponseFormat::JsonSchema` is honored natively
    fn supports_native_schema(&self) -> bool {
        false
    }

    /// Non-streaming completion returning the full text
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Open a streaming completion. Returns once the response headers
    /// arrived; the stream ends after `StreamChunk::Done` or on EOF.
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream>;
}
