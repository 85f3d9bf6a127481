// crates/quarry-server/src/orchestrator/queries.rs
// Query rewriting, search-term extraction, and follow-up questions

use crate::error::Result;
use crate::llm::{AgentRole, Agents, StructuredOutput};
use crate::orchestrator::prompts::{self, render};
use crate::search::digest::related_context;
use quarry_types::SearchHit;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

/// Lead-ins models like to put in front of a rewritten question
const REPHRASE_PREFIXES: &[&str] = &[
    "Here is the rephrased question:",
    "The rephrased question is:",
    "Rephrased question:",
    "Rephrased Question:",
    "Rephrased query:",
    "Rephrased Query:",
];

/// Number of follow-up questions per answer
pub const RELATED_COUNT: usize = 3;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RelatedQueries {
    pub related_questions: Vec<String>,
}

impl StructuredOutput for RelatedQueries {
    const NAME: &'static str = "related_queries";

    fn check(&self) -> std::result::Result<(), String> {
        if self.related_questions.len() == RELATED_COUNT {
            Ok(())
        } else {
            Err(format!(
                "expected {} related questions, got {}",
                RELATED_COUNT,
                self.related_questions.len()
            ))
        }
    }
}

fn clean_rephrase(raw: &str) -> String {
    let text = raw.replace(['"', '\''], "");
    let trimmed = text.trim();
    REPHRASE_PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(*prefix))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Rewrite a follow-up into a standalone question.
///
/// Conversation memory is keyed by `session_id` on the provider side.
/// Never fails: any error or empty answer yields the original query.
pub async fn rephrase(agents: &Agents, query: &str, session_id: &str) -> String {
    match agents
        .complete(
            AgentRole::Rephrase,
            prompts::REPHRASE_PROMPT.to_string(),
            query.to_string(),
            session_id,
        )
        .await
    {
        Ok(raw) => {
            let cleaned = clean_rephrase(&raw);
            if cleaned.is_empty() {
                query.to_string()
            } else {
                debug!(original = %query, rephrased = %cleaned, "Query rephrased");
                cleaned
            }
        }
        Err(e) => {
            warn!(error = %e, "Rephrase failed, using original query");
            query.to_string()
        }
    }
}

/// Condense a request into a search query. Falls back to the request itself.
pub async fn extract_search_terms(agents: &Agents, query: &str, session_id: &str) -> String {
    let system = render(prompts::SEARCH_TERMS_PROMPT, &[
        ("user_query", query),
        ("current_datetime", prompts::current_datetime().as_str()),
    ]);
    match agents
        .complete(AgentRole::SearchTerms, system, query.to_string(), session_id)
        .await
    {
        Ok(raw) => {
            let terms = raw.replace('"', "").trim().to_string();
            if terms.is_empty() { query.to_string() } else { terms }
        }
        Err(e) => {
            warn!(error = %e, "Search term extraction failed, searching the raw query");
            query.to_string()
        }
    }
}

/// Three follow-up questions, lowercased and without question marks
pub async fn related_questions(
    agents: &Agents,
    query: &str,
    hits: &[SearchHit],
    session_id: &str,
) -> Result<Vec<String>> {
    let system = render(prompts::RELATED_PROMPT, &[
        ("user_query", query),
        ("search_context", related_context(hits).as_str()),
    ]);
    let related: RelatedQueries = agents
        .structured(
            AgentRole::Related,
            system,
            prompts::RELATED_INSTRUCTION.to_string(),
            session_id,
        )
        .await?;
    Ok(related
        .related_questions
        .into_iter()
        .map(|q| q.to_lowercase().replace('?', "").trim().to_string())
        .collect())
}

/// Query text for the answer prompt, noting an active date range
pub fn query_with_date_context(query: &str, start: Option<&str>, end: Option<&str>) -> String {
    match (start, end) {
        (Some(s), Some(e)) => format!("{} (searching for results between {} and {})", query, s, e),
        (Some(s), None) => format!("{} (searching for results from {} onwards)", query, s),
        (None, Some(e)) => format!("{} (searching for results up to {})", query, e),
        (None, None) => query.to_string(),
    }
}
