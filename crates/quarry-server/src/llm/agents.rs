// crates/quarry-server/src/llm/agents.rs
// Per-role model assignment over one shared LLM client

use crate::error::Result;
use crate::llm::client::{LlmClient, TextStream};
use crate::llm::provider::{AgentRole, CompletionRequest};
use crate::llm::structured::StructuredOutput;

/// The roles of the answer engine, each bound to a model.
///
/// All roles share the client, and with it the breaker pair, so a failing
/// provider trips once for everyone.
#[derive(Clone)]
pub struct Agents {
    client: LlmClient,
    reasoning_model: String,
    fast_model: String,
}

impl Agents {
    pub fn new(client: LlmClient, reasoning_model: impl Into<String>, fast_model: impl Into<String>) -> Self {
        Self {
            client,
            reasoning_model: reasoning_model.into(),
            fast_model: fast_model.into(),
        }
    }

    pub fn model_for(&self, role: AgentRole) -> &str {
        if role.uses_reasoning_model() {
            &self.reasoning_model
        } else {
            &self.fast_model
        }
    }

    pub fn request(&self, role: AgentRole, system: String, user: String, session_id: &str) -> CompletionRequest {
        CompletionRequest::new(role, self.model_for(role), system, user, session_id)
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    pub async fn complete(&self, role: AgentRole, system: String, user: String, session_id: &str) -> Result<String> {
        self.client
            .complete(self.request(role, system, user, session_id))
            .await
    }

    pub async fn stream(&self, role: AgentRole, system: String, user: String, session_id: &str) -> Result<TextStream> {
        self.client
            .stream(self.request(role, system, user, session_id))
            .await
    }

    pub async fn structured<T: StructuredOutput>(
        &self,
        role: AgentRole,
        system: String,
        user: String,
        session_id: &str,
    ) -> Result<T> {
        self.client
            .structured(self.request(role, system, user, session_id))
            .await
    }
}
