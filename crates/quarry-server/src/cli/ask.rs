// crates/quarry-server/src/cli/ask.rs
// One-shot query from the command line

use super::AskArgs;
use anyhow::{Result, bail};
use futures::StreamExt;
use quarry::config::Config;
use quarry::types::{ChatRequest, StreamEvent};
use quarry::web::state::AppState;
use std::io::Write;

pub async fn run_ask(args: AskArgs) -> Result<()> {
    let config = Config::load();
    let state = AppState::from_config(&config)?;

    let mut request = ChatRequest::new(args.query).with_pro_search(args.pro);
    request.session_id = args.session;
    request.time_range = args.time_range;

    let mut events = state.orchestrator.clone().stream(request);
    let mut stdout = std::io::stdout();
    let mut failure = None;

    while let Some(event) = events.next().await {
        if args.json {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
            if let StreamEvent::Error { detail } = &event {
                failure = Some(detail.clone());
            }
            continue;
        }

        match event {
            StreamEvent::Plan { steps } => {
                for (i, step) in steps.iter().enumerate() {
                    eprintln!("  {}. {}", i + 1, step);
                }
            }
            StreamEvent::StepQueries { step_number, queries } => {
                eprintln!("  [step {}] searching: {}", step_number, queries.join(" | "));
            }
            StreamEvent::TextDelta { text } => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            StreamEvent::SearchResults { results, .. } => {
                eprintln!("  {} sources", results.len());
            }
            StreamEvent::RelatedQueries { related_queries } => {
                writeln!(stdout)?;
                if !related_queries.is_empty() {
                    writeln!(stdout, "\nRelated:")?;
                    for q in related_queries {
                        writeln!(stdout, "  - {}", q)?;
                    }
                }
            }
            StreamEvent::StreamEnd { session_id } => {
                eprintln!("\nsession: {}", session_id);
            }
            StreamEvent::Error { detail } => {
                failure = Some(detail);
            }
            _ => {}
        }
    }

    if let Some(detail) = failure {
        bail!(detail);
    }
    Ok(())
}
