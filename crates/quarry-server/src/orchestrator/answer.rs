// crates/quarry-server/src/orchestrator/answer.rs
// Answer phase shared by the planned and single-shot paths

use crate::error::Result;
use crate::llm::{AgentRole, Agents};
use crate::orchestrator::events::EventSink;
use crate::orchestrator::prompts::{self, render};
use crate::orchestrator::queries;
use futures::StreamExt;
use quarry_types::{SearchHit, StreamEvent};
use std::time::Instant;
use tokio_util::task::AbortOnDropHandle;
use tracing::{info, warn};

/// Everything the answer phase needs once searching is done
pub struct AnswerInput {
    /// Query the answer and follow-ups are about
    pub query: String,
    /// Query text placed in the answer prompt, with any date-range note
    pub prompt_query: String,
    /// Prompt context built from `hits`
    pub context: String,
    pub hits: Vec<SearchHit>,
    pub images: Vec<String>,
    pub session_id: String,
}

/// Stream the answer and finish the event sequence.
///
/// Emits search-results, text deltas, related-queries, final-text, and
/// stream-end in that order. Follow-up generation runs alongside the
/// answer stream and is aborted if this future is dropped. Its failure
/// only empties the follow-up list.
pub async fn deliver(agents: &Agents, sink: &mut EventSink, input: AnswerInput) -> Result<()> {
    let AnswerInput {
        query,
        prompt_query,
        context,
        hits,
        images,
        session_id,
    } = input;

    let related = {
        let agents = agents.clone();
        let hits = hits.clone();
        let session_id = session_id.clone();
        AbortOnDropHandle::new(tokio::spawn(async move {
            queries::related_questions(&agents, &query, &hits, &session_id).await
        }))
    };

    sink.emit(StreamEvent::SearchResults { results: hits, images }).await?;

    let system = render(prompts::ANSWER_PROMPT, &[
        ("search_context", context.as_str()),
        ("current_datetime", prompts::current_datetime().as_str()),
        ("user_query", prompt_query.as_str()),
    ]);
    let started = Instant::now();
    let mut stream = agents
        .stream(AgentRole::Answer, system, prompts::ANSWER_INSTRUCTION.to_string(), &session_id)
        .await?;

    let mut full_text = String::new();
    while let Some(chunk) = stream.next().await {
        let text = chunk?;
        if text.is_empty() {
            continue;
        }
        full_text.push_str(&text);
        sink.emit(StreamEvent::TextDelta { text }).await?;
    }
    info!(
        chars = full_text.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Answer streamed"
    );

    let related_queries = match related.await {
        Ok(Ok(questions)) => questions,
        Ok(Err(e)) => {
            warn!(error = %e, "Related questions failed, sending none");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "Related questions task did not finish");
            Vec::new()
        }
    };

    sink.emit(StreamEvent::RelatedQueries { related_queries }).await?;
    sink.emit(StreamEvent::FinalText { message: full_text }).await?;
    sink.emit(StreamEvent::StreamEnd { session_id }).await
}
