// crates/quarry-server/src/cli/mod.rs
// CLI module for Quarry commands

use clap::{Parser, Subcommand};

pub mod ask;
pub mod serve;

pub use ask::run_ask;
pub use serve::run_server;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Resilient multi-step search and answer engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on (default: QUARRY_PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Answer one query and print the result
    Ask(AskArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct AskArgs {
    /// The question to answer
    #[arg(index = 1)]
    pub query: String,

    /// Plan and run multiple search steps
    #[arg(long)]
    pub pro: bool,

    /// Continue an earlier session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Limit results to the last day, week, month, or year
    #[arg(short, long, value_parser = parse_time_range)]
    pub time_range: Option<quarry::types::TimeRange>,

    /// Print every event as a JSON line instead of the answer text
    #[arg(long)]
    pub json: bool,

    /// Show info-level logs
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_time_range(s: &str) -> Result<quarry::types::TimeRange, String> {
    quarry::types::TimeRange::parse(s)
        .ok_or_else(|| format!("unknown time range '{}', expected day, week, month, or year", s))
}
