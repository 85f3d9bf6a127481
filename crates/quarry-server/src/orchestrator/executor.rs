// crates/quarry-server/src/orchestrator/executor.rs
// Planned execution: search steps in plan order, then synthesis

use crate::error::Result;
use crate::llm::Agents;
use crate::orchestrator::answer::{self, AnswerInput};
use crate::orchestrator::events::EventSink;
use crate::orchestrator::planner::{ExecutionPlan, PlanStep, StepPlanner};
use crate::orchestrator::queries::query_with_date_context;
use crate::search::aggregator::{dedup_by_url, dedup_images};
use crate::search::digest::{step_digest, synthesis_context};
use crate::search::{SearchAggregator, SearchOptions};
use quarry_types::{SearchHit, StreamEvent};
use std::collections::HashMap;
use tracing::{debug, info, info_span, Instrument};

/// Most results handed to the synthesis step
pub const MAX_SYNTHESIS_RESULTS: usize = 12;

/// Most images taken from each dependency of the synthesis step
pub const IMAGES_PER_DEPENDENCY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    NotStarted,
    /// Index into the plan's step array
    Step(usize),
    Finished,
    Failed,
}

/// What one search step produced
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub step: String,
    /// Truncated text digest fed to later prompts
    pub digest: String,
    pub hits: Vec<SearchHit>,
    pub images: Vec<String>,
}

/// Per-request inputs
#[derive(Debug, Clone)]
pub struct RunContext {
    pub query: String,
    pub session_id: String,
    pub options: SearchOptions,
}

/// Context block for a step's query-expansion prompt
pub fn dependency_context(step: &PlanStep, contexts: &HashMap<u32, StepContext>) -> String {
    step.dependencies
        .iter()
        .filter_map(|id| contexts.get(id))
        .map(|ctx| format!("Step: {}\nContext: {}", ctx.step, ctx.digest))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pick synthesis sources spread evenly over the dependencies.
///
/// Each dependency contributes up to `min(12 / n, total / n)` hits, so the
/// per-dependency quota never exceeds the average actually available.
pub fn select_sources(deps: &[&StepContext]) -> (Vec<SearchHit>, Vec<String>) {
    if deps.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let n = deps.len();
    let total: usize = deps.iter().map(|d| d.hits.len()).sum();
    let quota = (MAX_SYNTHESIS_RESULTS / n).min(total / n);

    let hits = dedup_by_url(
        deps.iter()
            .flat_map(|d| d.hits.iter().take(quota).cloned())
            .collect(),
    );
    let images = dedup_images(
        deps.iter()
            .flat_map(|d| d.images.iter().take(IMAGES_PER_DEPENDENCY).cloned()),
    );
    (hits, images)
}

/// Runs a validated plan against the event sink
pub struct PlanExecutor<'a> {
    planner: &'a StepPlanner,
    aggregator: &'a SearchAggregator,
    agents: &'a Agents,
    state: ExecutorState,
    contexts: HashMap<u32, StepContext>,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(planner: &'a StepPlanner, aggregator: &'a SearchAggregator, agents: &'a Agents) -> Self {
        Self {
            planner,
            aggregator,
            agents,
            state: ExecutorState::NotStarted,
            contexts: HashMap::new(),
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub async fn execute(&mut self, plan: &ExecutionPlan, run: &RunContext, sink: &mut EventSink) -> Result<()> {
        let result = self.run_steps(plan, run, sink).await;
        self.state = match result {
            Ok(()) => ExecutorState::Finished,
            Err(_) => ExecutorState::Failed,
        };
        result
    }

    async fn run_steps(&mut self, plan: &ExecutionPlan, run: &RunContext, sink: &mut EventSink) -> Result<()> {
        for (idx, step) in plan.search_steps().iter().enumerate() {
            self.state = ExecutorState::Step(idx);
            self.search_step(step, run, sink)
                .instrument(info_span!("step", step = step.id))
                .await?;
        }

        self.state = ExecutorState::Step(plan.len() - 1);
        self.synthesize(plan.terminal(), run, sink).await
    }

    async fn search_step(&mut self, step: &PlanStep, run: &RunContext, sink: &mut EventSink) -> Result<()> {
        let prev_context = dependency_context(step, &self.contexts);
        let queries = self
            .planner
            .expand(&run.query, step, &prev_context, &run.session_id)
            .await?;

        sink.emit(StreamEvent::StepQueries {
            step_number: step.id,
            queries: queries.clone(),
        })
        .await?;

        let batch = self.aggregator.gather(&queries, &run.options).await;
        let digest = step_digest(&batch.hits);
        info!(queries = queries.len(), hits = batch.hits.len(), "Step searched");

        sink.emit(StreamEvent::StepResults {
            step_number: step.id,
            results: batch.hits.clone(),
        })
        .await?;

        self.contexts.insert(step.id, StepContext {
            step: step.step.clone(),
            digest,
            hits: batch.hits,
            images: batch.images,
        });
        Ok(())
    }

    async fn synthesize(&self, terminal: &PlanStep, run: &RunContext, sink: &mut EventSink) -> Result<()> {
        sink.emit(StreamEvent::AgentFinishPlanning {}).await?;
        sink.emit(StreamEvent::BeginStream { query: run.query.clone() }).await?;

        let deps: Vec<&StepContext> = terminal
            .dependencies
            .iter()
            .filter_map(|id| self.contexts.get(id))
            .collect();
        let (hits, images) = select_sources(&deps);
        let context = synthesis_context(deps.iter().map(|d| (d.step.as_str(), d.digest.as_str())));
        debug!(dependencies = deps.len(), hits = hits.len(), "Synthesis sources selected");

        let prompt_query = query_with_date_context(
            &run.query,
            run.options.start_date.as_deref(),
            run.options.end_date.as_deref(),
        );
        answer::deliver(self.agents, sink, AnswerInput {
            query: run.query.clone(),
            prompt_query,
            context,
            hits,
            images,
            session_id: run.session_id.clone(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(step: &str, urls: &[&str], images: &[&str]) -> StepContext {
        StepContext {
            step: step.into(),
            digest: format!("digest of {}", step),
            hits: urls.iter().map(|u| SearchHit::new(*u, *u, "")).collect(),
            images: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn urls(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.url.as_str()).collect()
    }

    // ========================================================================
    // Source selection
    // ========================================================================

    #[test]
    fn test_quota_never_exceeds_average_available() {
        let big: Vec<String> = (0..10).map(|i| format!("big{}", i)).collect();
        let big_refs: Vec<&str> = big.iter().map(String::as_str).collect();
        let a = ctx("a", &big_refs, &[]);
        let b = ctx("b", &["s0", "s1", "s2"], &[]);

        let (hits, _) = select_sources(&[&a, &b]);
        // quota = min(12 / 2, 13 / 2) = 6
        assert_eq!(hits.len(), 9);
        assert_eq!(hits.iter().filter(|h| h.url.starts_with("big")).count(), 6);
    }

    #[test]
    fn test_selection_caps_at_twelve() {
        let many: Vec<String> = (0..20).map(|i| format!("u{}", i)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let only = ctx("only", &refs, &[]);
        let (hits, _) = select_sources(&[&only]);
        assert_eq!(hits.len(), MAX_SYNTHESIS_RESULTS);
    }

    #[test]
    fn test_selection_dedups_across_dependencies() {
        let a = ctx("a", &["x", "y"], &["i1", "i2", "i3"]);
        let b = ctx("b", &["y", "z"], &["i2", "i4"]);
        let (hits, images) = select_sources(&[&a, &b]);
        assert_eq!(urls(&hits), vec!["x", "y", "z"]);
        assert_eq!(images, vec!["i1", "i2", "i4"]);
    }

    #[test]
    fn test_selection_without_dependencies() {
        let (hits, images) = select_sources(&[]);
        assert!(hits.is_empty());
        assert!(images.is_empty());
    }

    // ========================================================================
    // Prompt context
    // ========================================================================

    #[test]
    fn test_dependency_context_uses_listed_steps_only() {
        let contexts = HashMap::from([
            (1, ctx("find A", &[], &[])),
            (2, ctx("find B", &[], &[])),
        ]);
        let step = PlanStep::new(3, "compare", vec![2]);
        assert_eq!(
            dependency_context(&step, &contexts),
            "Step: find B\nContext: digest of find B"
        );

        let both = PlanStep::new(3, "compare", vec![1, 2]);
        assert_eq!(dependency_context(&both, &contexts).lines().count(), 4);

        let none = PlanStep::new(1, "first", vec![]);
        assert_eq!(dependency_context(&none, &contexts), "");
    }
}
