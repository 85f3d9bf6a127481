// crates/quarry-server/src/llm/mod.rs
// LLM providers, the resilient client, and structured output

pub mod agents;
pub mod client;
pub mod openai;
pub mod provider;
pub mod structured;

pub use agents::Agents;
pub use client::{LlmClient, TextStream};
pub use openai::OpenAiCompatProvider;
pub use provider::{AgentRole, ChunkStream, CompletionRequest, LlmProvider, ResponseFormat, StreamChunk};
pub use structured::StructuredOutput;
