// crates/quarry-server/src/llm/client.rs
// Resilient LLM client: breaker gate, retry, then the provider call

use crate::error::{ProviderError, QuarryError, Result};
use crate::llm::provider::{CompletionRequest, LlmProvider, ResponseFormat, StreamChunk};
use crate::llm::structured::{self, StructuredOutput};
use crate::resilience::{BreakerPair, Guard, RetryPolicy, counts_against_breaker};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, warn};

/// Text deltas of one streamed answer. Ends cleanly only after the
/// provider's completion marker; any other ending is an `Err` item.
pub type TextStream = BoxStream<'static, Result<String>>;

/// LLM calls wrapped in circuit breaking and retry.
///
/// Non-streaming calls go through the completion breaker with the
/// full-call policy. Streams go through the streaming breaker and only
/// their connection phase is retried.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    call_guard: Guard,
    stream_guard: Guard,
}

impl LlmClient {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        breakers: &BreakerPair,
        full_call: RetryPolicy,
        connection: RetryPolicy,
    ) -> Self {
        let name = provider.name().to_string();
        Self {
            call_guard: Guard::new(name.clone(), breakers.completion.clone(), full_call),
            stream_guard: Guard::new(name, breakers.streaming.clone(), connection),
            provider,
        }
    }

    /// Client with the default retry policies
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, breakers: &BreakerPair) -> Self {
        Self::new(
            provider,
            breakers,
            RetryPolicy::full_call(),
            RetryPolicy::connection_establishment(),
        )
    }

    /// Full non-streaming completion
    pub async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let label = format!("{}:{}", self.provider.name(), request.role);
        self.call_guard
            .call(&label, || self.provider.complete(&request))
            .await
    }

    /// Streamed completion.
    ///
    /// Retries happen only while connecting. Once the stream is returned no
    /// further attempt is made for this call, so a delta is never repeated.
    pub async fn stream(&self, request: CompletionRequest) -> Result<TextStream> {
        let label = format!("{}:{}", self.provider.name(), request.role);
        let mut chunks = self
            .stream_guard
            .connect(&label, || self.provider.stream(&request))
            .await?;

        let breaker = self.stream_guard.breaker().clone();
        let provider = self.provider.name().to_string();

        Ok(Box::pin(async_stream::stream! {
            loop {
                match chunks.next().await {
                    Some(Ok(StreamChunk::Delta(text))) => yield Ok(text),
                    Some(Ok(StreamChunk::Done)) => {
                        breaker.record_success();
                        debug!(call = %label, "Stream completed");
                        break;
                    }
                    Some(Err(e)) => {
                        if counts_against_breaker(&e) {
                            breaker.record_failure();
                        }
                        warn!(call = %label, error = %e, "Stream failed mid-response");
                        yield Err(e);
                        break;
                    }
                    None => {
                        breaker.record_failure();
                        warn!(call = %label, "Stream ended without completion marker");
                        yield Err(QuarryError::provider(
                            provider.clone(),
                            ProviderError::Stream("stream ended without completion marker".into()),
                        ));
                        break;
                    }
                }
            }
        }))
    }

    /// Completion parsed into `T`.
    ///
    /// Native schema mode when the provider supports it; otherwise JSON
    /// object mode with the schema spelled out in the system prompt.
    pub async fn structured<T: StructuredOutput>(&self, mut request: CompletionRequest) -> Result<T> {
        if self.provider.supports_native_schema() {
            request.format = ResponseFormat::JsonSchema {
                name: T::NAME.to_string(),
                schema: structured::schema_value::<T>(),
            };
        } else {
            request.format = ResponseFormat::JsonObject;
            request.system.push_str(&structured::schema_hint::<T>());
        }

        let raw = self.complete(request).await?;
        structured::extract::<T>(&raw)
    }
}
