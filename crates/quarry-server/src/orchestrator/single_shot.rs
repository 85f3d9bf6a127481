// crates/quarry-server/src/orchestrator/single_shot.rs
// Single-shot path: one search, one answer

use crate::error::Result;
use crate::llm::Agents;
use crate::orchestrator::answer::{self, AnswerInput};
use crate::orchestrator::events::EventSink;
use crate::orchestrator::executor::RunContext;
use crate::orchestrator::queries::{extract_search_terms, query_with_date_context};
use crate::search::SearchAggregator;
use crate::search::digest::citation_context;
use quarry_types::StreamEvent;
use tracing::info;

/// Search once with extracted terms and answer from numbered citations.
///
/// Also the fallback for a failed planned run, so it always starts the
/// event sequence from the top.
pub async fn run(
    agents: &Agents,
    aggregator: &SearchAggregator,
    run: &RunContext,
    sink: &mut EventSink,
) -> Result<()> {
    sink.emit(StreamEvent::BeginStream { query: run.query.clone() }).await?;

    let terms = extract_search_terms(agents, &run.query, &run.session_id).await;
    let batch = aggregator.gather(std::slice::from_ref(&terms), &run.options).await;
    info!(terms = %terms, hits = batch.hits.len(), "Single-shot search complete");

    let context = citation_context(&batch.hits);
    let prompt_query = query_with_date_context(
        &run.query,
        run.options.start_date.as_deref(),
        run.options.end_date.as_deref(),
    );

    answer::deliver(agents, sink, AnswerInput {
        query: run.query.clone(),
        prompt_query,
        context,
        hits: batch.hits,
        images: batch.images,
        session_id: run.session_id.clone(),
    })
    .await
}
