// crates/quarry-server/src/llm/openai.rs
// OpenAI-compatible chat completions client (OpenAI, vLLM, Ollama, LiteLLM, ...)

use crate::config::EnvConfig;
use crate::error::{ProviderError, QuarryError, Result};
use crate::http::{LLM_TIMEOUT, STREAM_IDLE_TIMEOUT, STREAM_MAX_DURATION};
use crate::llm::provider::{ChunkStream, CompletionRequest, LlmProvider, ResponseFormat, StreamChunk};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

const PROVIDER_NAME: &str = "openai";

/// Upper bound on error bodies carried into errors and logs
const MAX_ERROR_BODY: usize = 500;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    user: &'a str,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn response_format_value(format: &ResponseFormat) -> Option<Value> {
    match format {
        ResponseFormat::Text => None,
        ResponseFormat::JsonObject => Some(json!({ "type": "json_object" })),
        ResponseFormat::JsonSchema { name, schema } => Some(json!({
            "type": "json_schema",
            "json_schema": { "name": name, "schema": schema, "strict": false }
        })),
    }
}

/// Parse a non-streaming response body into its message text
fn parse_completion(body: &str) -> std::result::Result<String, ProviderError> {
    let data: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("invalid completion body: {}", e)))?;
    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::Malformed("response had no message content".into()))
}

/// One parsed server-sent-events line
#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Delta(String),
    Done,
    Error(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        // comments, `event:` lines, blank separators
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamPayload>(data) {
        Ok(payload) => {
            if let Some(err) = payload.error {
                return SseLine::Error(err.to_string());
            }
            let text: String = payload
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if text.is_empty() { SseLine::Skip } else { SseLine::Delta(text) }
        }
        Err(e) => SseLine::Error(format!("unparseable stream payload: {}", e)),
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Stream item for one line, and whether it ends the stream
fn line_item(line: &str) -> Option<(Result<StreamChunk>, bool)> {
    match parse_sse_line(line.trim()) {
        SseLine::Skip => None,
        SseLine::Delta(text) => Some((Ok(StreamChunk::Delta(text)), false)),
        SseLine::Done => Some((Ok(StreamChunk::Done), true)),
        SseLine::Error(msg) => Some((
            Err(QuarryError::provider(PROVIDER_NAME, ProviderError::Stream(msg))),
            true,
        )),
    }
}

/// Turn a streaming HTTP response into provider chunks.
///
/// Lines are split on raw bytes so multi-byte characters that straddle
/// network chunks stay intact. Each read is bounded by `idle` and the
/// whole stream by `max`. A last line without a trailing newline is
/// still parsed at end of body.
fn sse_chunks(response: reqwest::Response, idle: Duration, max: Duration) -> ChunkStream {
    Box::pin(async_stream::stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let deadline = tokio::time::Instant::now() + max;

        loop {
            let idle_at = tokio::time::Instant::now() + idle;
            let next = match tokio::time::timeout_at(idle_at.min(deadline), bytes.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let reason = if idle_at < deadline {
                        format!("no data for {}s", idle.as_secs_f32())
                    } else {
                        format!("stream exceeded {}s", max.as_secs_f32())
                    };
                    yield Err(QuarryError::provider(PROVIDER_NAME, ProviderError::Stream(reason)));
                    return;
                }
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    yield Err(QuarryError::provider(PROVIDER_NAME, ProviderError::Stream(e.to_string())));
                    return;
                }
                None => {
                    let rest = String::from_utf8_lossy(&buffer).into_owned();
                    if let Some((item, _)) = line_item(&rest) {
                        yield item;
                    }
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some((item, last)) = line_item(&String::from_utf8_lossy(&line)) {
                    yield item;
                    if last {
                        return;
                    }
                }
            }
        }
    })
}

// ============================================================================
// Provider
// ============================================================================

/// Chat completions over HTTP against any OpenAI-compatible endpoint
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    native_schema: bool,
    request_timeout: Duration,
    idle_timeout: Duration,
    stream_max: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            native_schema: false,
            request_timeout: LLM_TIMEOUT,
            idle_timeout: STREAM_IDLE_TIMEOUT,
            stream_max: STREAM_MAX_DURATION,
        }
    }

    pub fn from_config(http: reqwest::Client, env: &EnvConfig) -> Self {
        Self::new(http, env.base_url.clone(), env.api_key.clone())
            .with_native_schema(env.uses_native_schema())
    }

    pub fn with_native_schema(mut self, native: bool) -> Self {
        self.native_schema = native;
        self
    }

    /// Full-call timeout for completions, and the wait for response
    /// headers when opening a stream
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_stream_max(mut self, max: Duration) -> Self {
        self.stream_max = max;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build(&self, request: &CompletionRequest, stream: bool) -> reqwest::RequestBuilder {
        let body = ChatBody {
            model: &request.model,
            messages: [
                WireMessage { role: "system", content: &request.system },
                WireMessage { role: "user", content: &request.user },
            ],
            stream,
            response_format: response_format_value(&request.format),
            user: &request.session_id,
        };
        let mut builder = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn err(source: ProviderError) -> QuarryError {
        QuarryError::provider(PROVIDER_NAME, source)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::err(ProviderError::from_status(status.as_u16(), truncate_body(body))))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_native_schema(&self) -> bool {
        self.native_schema
    }

    #[instrument(skip_all, fields(role = %request.role, model = %request.model, session_id = %request.session_id))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let start = Instant::now();
        let response = self
            .build(request, false)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Self::err(e.into()))?;
        let response = Self::check_status(response).await?;
        let body = response.text().await.map_err(|e| Self::err(e.into()))?;
        let text = parse_completion(&body).map_err(Self::err)?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            chars = text.len(),
            "Completion received"
        );
        Ok(text)
    }

    #[instrument(skip_all, fields(role = %request.role, model = %request.model, session_id = %request.session_id))]
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let open = async {
            let response = self
                .build(request, true)
                .send()
                .await
                .map_err(|e| Self::err(e.into()))?;
            Self::check_status(response).await
        };
        // Headers only; the body is bounded by the idle and total limits
        let response = tokio::time::timeout(self.request_timeout, open)
            .await
            .map_err(|_| Self::err(ProviderError::Timeout))??;
        debug!("Stream opened");
        Ok(sse_chunks(response, self.idle_timeout, self.stream_max))
    }
}
