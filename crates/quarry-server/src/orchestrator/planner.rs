// crates/quarry-server/src/orchestrator/planner.rs
// Query decomposition into a validated step plan, and per-step query expansion

use crate::error::{QuarryError, Result};
use crate::llm::{AgentRole, Agents, StructuredOutput};
use crate::orchestrator::prompts::{self, render};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Upper bound on plan length, synthesis step included
pub const MAX_STEPS: usize = 4;

/// Upper bound on search queries generated for one step
pub const MAX_QUERIES_PER_STEP: usize = 3;

/// One unit of the plan: a search sub-task, or the final synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub id: u32,
    pub step: String,
    /// Ids of earlier steps whose results this step uses
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

impl PlanStep {
    pub fn new(id: u32, step: impl Into<String>, dependencies: Vec<u32>) -> Self {
        Self {
            id,
            step: step.into(),
            dependencies,
        }
    }
}

/// Raw planner output, validated into an `ExecutionPlan`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryPlan {
    pub steps: Vec<PlanStep>,
}

impl StructuredOutput for QueryPlan {
    const NAME: &'static str = "query_plan";
}

/// Search queries for one step
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryStepExecution {
    pub search_queries: Option<Vec<String>>,
}

impl StructuredOutput for QueryStepExecution {
    const NAME: &'static str = "query_step_execution";

    fn check(&self) -> std::result::Result<(), String> {
        match &self.search_queries {
            Some(queries) if queries.len() > MAX_QUERIES_PER_STEP => Err(format!(
                "at most {} search queries per step, got {}",
                MAX_QUERIES_PER_STEP,
                queries.len()
            )),
            _ => Ok(()),
        }
    }
}

/// A plan that passed validation. Every step but the last is a search
/// step; the last is the synthesis step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn new(mut steps: Vec<PlanStep>) -> Result<Self> {
        let invalid = |msg: String| Err(QuarryError::PlanValidation(msg));

        if steps.is_empty() {
            return invalid("planner returned no steps".into());
        }
        if steps.len() > MAX_STEPS {
            return invalid(format!("{} steps exceeds the limit of {}", steps.len(), MAX_STEPS));
        }
        if steps.len() == 1 {
            return invalid("plan has no search step".into());
        }

        let mut position = HashMap::with_capacity(steps.len());
        for (idx, step) in steps.iter().enumerate() {
            if position.insert(step.id, idx).is_some() {
                return invalid(format!("duplicate step id {}", step.id));
            }
        }

        for (idx, step) in steps.iter().enumerate() {
            for dep in &step.dependencies {
                match position.get(dep) {
                    None => return invalid(format!("step {} depends on unknown step {}", step.id, dep)),
                    Some(&dep_idx) if dep_idx >= idx => {
                        return invalid(format!("step {} depends on later step {}", step.id, dep));
                    }
                    Some(_) => {}
                }
            }
        }

        // A synthesis step without dependencies draws on everything before it
        let (last, earlier) = steps.split_last_mut().ok_or_else(|| {
            QuarryError::PlanValidation("planner returned no steps".into())
        })?;
        if last.dependencies.is_empty() {
            last.dependencies = earlier.iter().map(|s| s.id).collect();
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn search_steps(&self) -> &[PlanStep] {
        &self.steps[..self.steps.len() - 1]
    }

    pub fn terminal(&self) -> &PlanStep {
        &self.steps[self.steps.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Planning and query expansion calls
#[derive(Clone)]
pub struct StepPlanner {
    agents: Agents,
}

impl StepPlanner {
    pub fn new(agents: Agents) -> Self {
        Self { agents }
    }

    /// Decompose the query into a validated plan
    pub async fn plan(&self, query: &str, session_id: &str) -> Result<ExecutionPlan> {
        let system = render(prompts::PLAN_PROMPT, &[
            ("user_query", query),
            ("current_datetime", prompts::current_datetime().as_str()),
        ]);
        let raw: QueryPlan = self
            .agents
            .structured(AgentRole::Planning, system, query.to_string(), session_id)
            .await?;
        let plan = ExecutionPlan::new(raw.steps)?;
        info!(steps = plan.len(), "Query plan ready");
        Ok(plan)
    }

    /// Search queries for one search step.
    ///
    /// `prev_context` carries the digests of the step's dependencies.
    /// Zero usable queries is a plan validation failure.
    pub async fn expand(
        &self,
        query: &str,
        step: &PlanStep,
        prev_context: &str,
        session_id: &str,
    ) -> Result<Vec<String>> {
        let system = render(prompts::SEARCH_QUERY_PROMPT, &[
            ("user_query", query),
            ("current_step", step.step.as_str()),
            ("prev_steps_context", prev_context),
            ("current_datetime", prompts::current_datetime().as_str()),
        ]);
        let raw: QueryStepExecution = self
            .agents
            .structured(AgentRole::SearchQuery, system, step.step.clone(), session_id)
            .await?;

        let queries: Vec<String> = raw
            .search_queries
            .unwrap_or_default()
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();

        if queries.is_empty() {
            return Err(QuarryError::PlanValidation(format!(
                "step {} produced no search queries",
                step.id
            )));
        }
        debug!(step = step.id, queries = ?queries, "Step expanded");
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{ChunkStream, CompletionRequest, LlmProvider};
    use crate::llm::LlmClient;
    use crate::resilience::BreakerPair;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn step(id: u32, deps: &[u32]) -> PlanStep {
        PlanStep::new(id, format!("step {}", id), deps.to_vec())
    }

    fn plan_err(steps: Vec<PlanStep>) -> String {
        match ExecutionPlan::new(steps) {
            Err(QuarryError::PlanValidation(msg)) => msg,
            other => panic!("expected plan validation error, got {:?}", other),
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_valid_plan() {
        let plan = ExecutionPlan::new(vec![step(1, &[]), step(2, &[]), step(3, &[1, 2])]).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.search_steps().len(), 2);
        assert_eq!(plan.terminal().id, 3);
        assert_eq!(plan.terminal().dependencies, vec![1, 2]);
    }

    #[test]
    fn test_terminal_without_deps_uses_all_earlier_steps() {
        let plan = ExecutionPlan::new(vec![step(10, &[]), step(20, &[10]), step(30, &[])]).unwrap();
        assert_eq!(plan.terminal().dependencies, vec![10, 20]);
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(plan_err(vec![]).contains("no steps"));
    }

    #[test]
    fn test_too_many_steps_rejected() {
        let steps = (1..=5).map(|i| step(i, &[])).collect();
        assert!(plan_err(steps).contains("exceeds"));
    }

    #[test]
    fn test_single_step_has_no_search() {
        assert!(plan_err(vec![step(1, &[])]).contains("no search step"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        assert!(plan_err(vec![step(1, &[]), step(1, &[])]).contains("duplicate"));
    }

    #[test]
    fn test_bad_dependencies_rejected() {
        assert!(plan_err(vec![step(1, &[]), step(2, &[9])]).contains("unknown"));
        assert!(plan_err(vec![step(1, &[2]), step(2, &[])]).contains("later"));
        assert!(plan_err(vec![step(1, &[1]), step(2, &[])]).contains("later"));
    }

    #[test]
    fn test_query_step_execution_check() {
        let ok = QueryStepExecution { search_queries: Some(vec!["a".into(); 3]) };
        assert!(ok.check().is_ok());
        let too_many = QueryStepExecution { search_queries: Some(vec!["a".into(); 4]) };
        assert!(too_many.check().is_err());
    }

    // ========================================================================
    // LLM calls
    // ========================================================================

    struct Canned(String);

    #[async_trait]
    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok(self.0.clone())
        }

        async fn stream(&self, _request: &CompletionRequest) -> Result<ChunkStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn planner(reply: &str) -> StepPlanner {
        let client = LlmClient::with_defaults(Arc::new(Canned(reply.into())), &BreakerPair::with_defaults("llm"));
        StepPlanner::new(Agents::new(client, "big", "small"))
    }

    #[tokio::test]
    async fn test_plan_parses_and_validates() {
        let reply = r#"{"steps": [{"id": 1, "step": "search"}, {"id": 2, "step": "answer"}]}"#;
        let plan = planner(reply).plan("q", "s").await.unwrap();
        assert_eq!(plan.terminal().dependencies, vec![1]);
    }

    #[tokio::test]
    async fn test_plan_with_empty_steps_is_validation_error() {
        let err = planner(r#"{"steps": []}"#).plan("q", "s").await.unwrap_err();
        assert!(matches!(err, QuarryError::PlanValidation(_)));
    }

    #[tokio::test]
    async fn test_expand_filters_blank_queries() {
        let reply = r#"{"search_queries": ["  rust 2024 ", "", "edition guide"]}"#;
        let queries = planner(reply).expand("q", &step(1, &[]), "", "s").await.unwrap();
        assert_eq!(queries, vec!["rust 2024", "edition guide"]);
    }

    #[tokio::test]
    async fn test_expand_without_queries_is_validation_error() {
        for reply in [r#"{"search_queries": null}"#, r#"{"search_queries": ["  "]}"#] {
            let err = planner(reply).expand("q", &step(7, &[]), "", "s").await.unwrap_err();
            assert!(matches!(err, QuarryError::PlanValidation(ref m) if m.contains("step 7")));
        }
    }
}
