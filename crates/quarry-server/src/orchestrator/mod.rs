// crates/quarry-server/src/orchestrator/mod.rs
// Request orchestration: planned execution with single-shot fallback

pub mod answer;
pub mod events;
pub mod executor;
pub mod planner;
pub mod prompts;
pub mod queries;
pub mod single_shot;

pub use events::EventSink;
pub use executor::{ExecutorState, PlanExecutor, RunContext};
pub use planner::{ExecutionPlan, PlanStep, StepPlanner};

use crate::error::{QuarryError, Result};
use crate::llm::Agents;
use crate::search::{SearchAggregator, SearchOptions};
use quarry_types::{ChatRequest, StreamEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Events buffered between a run and its consumer
const EVENT_BUFFER: usize = 64;

/// Answers chat requests, one event stream per request.
///
/// Holds no per-request state; clones of the collaborators share the
/// process-wide breakers.
pub struct Orchestrator {
    agents: Agents,
    planner: StepPlanner,
    aggregator: SearchAggregator,
    pro_enabled: bool,
}

impl Orchestrator {
    pub fn new(agents: Agents, aggregator: SearchAggregator) -> Self {
        Self {
            planner: StepPlanner::new(agents.clone()),
            agents,
            aggregator,
            pro_enabled: true,
        }
    }

    /// Allow planned execution. When off, pro requests run single-shot.
    pub fn with_pro_mode(mut self, enabled: bool) -> Self {
        self.pro_enabled = enabled;
        self
    }

    pub fn pro_enabled(&self) -> bool {
        self.pro_enabled
    }

    /// Run a request to completion, delivering events on `tx`.
    ///
    /// Every run that is not cancelled ends with exactly one stream-end.
    /// Failures are reported as one error event before it. Returns
    /// `Cancelled` when the consumer went away.
    pub async fn run(&self, request: ChatRequest, tx: mpsc::Sender<StreamEvent>) -> Result<()> {
        let mut sink = EventSink::new(tx);
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Err(reason) = request.validate() {
            let err = QuarryError::InvalidInput(reason);
            warn!(error = %err, "Rejected chat request");
            sink.emit(StreamEvent::Error { detail: err.to_user_string() }).await?;
            return sink.emit(StreamEvent::StreamEnd { session_id }).await;
        }

        let span = info_span!(
            "chat",
            request_id = %Uuid::new_v4(),
            session_id = %session_id,
            pro = request.pro_search,
        );
        self.answer(request, session_id, &mut sink).instrument(span).await
    }

    async fn answer(&self, request: ChatRequest, session_id: String, sink: &mut EventSink) -> Result<()> {
        // Follow-ups are rewritten against the provider's session memory
        let query = if request.session_id.is_some() {
            queries::rephrase(&self.agents, &request.query, &session_id).await
        } else {
            request.query.clone()
        };

        let run = RunContext {
            query,
            session_id,
            options: SearchOptions::from_request(&request),
        };

        let planned = request.pro_search && self.pro_enabled;
        if request.pro_search && !self.pro_enabled {
            debug!("Pro mode disabled, answering single-shot");
        }

        let result = if planned {
            match self.run_planned(&run, sink).await {
                Err(e) if e.is_recoverable() && !sink.has_ended() => {
                    warn!(error = %e, "Planned run failed, falling back to single-shot");
                    single_shot::run(&self.agents, &self.aggregator, &run, sink).await
                }
                other => other,
            }
        } else {
            single_shot::run(&self.agents, &self.aggregator, &run, sink).await
        };

        match result {
            Ok(()) => {
                info!("Request answered");
                Ok(())
            }
            Err(QuarryError::Cancelled) => {
                info!("Consumer disconnected, stopping");
                Err(QuarryError::Cancelled)
            }
            Err(e) if sink.has_ended() => Err(e),
            Err(e) => {
                error!(error = %e, "Request failed");
                sink.emit(StreamEvent::Error { detail: e.to_user_string() }).await?;
                sink.emit(StreamEvent::StreamEnd { session_id: run.session_id }).await
            }
        }
    }

    async fn run_planned(&self, run: &RunContext, sink: &mut EventSink) -> Result<()> {
        let plan = self.planner.plan(&run.query, &run.session_id).await?;
        sink.emit(StreamEvent::Plan {
            steps: plan.steps().iter().map(|s| s.step.clone()).collect(),
        })
        .await?;

        let mut executor = PlanExecutor::new(&self.planner, &self.aggregator, &self.agents);
        let result = executor.execute(&plan, run, sink).await;
        debug!(state = ?executor.state(), "Plan execution ended");
        result
    }

    /// Start a run on its own task and hand back the event stream.
    ///
    /// Dropping the stream cancels the run, including any in-flight
    /// provider calls.
    pub fn stream(self: Arc<Self>, request: ChatRequest) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let watcher = tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                result = self.run(request, tx) => {
                    if let Err(e) = result {
                        debug!(error = %e, "Run ended early");
                    }
                }
                _ = watcher.closed() => {
                    info!("Consumer disconnected, run abandoned");
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
