// crates/quarry-server/src/main.rs
// Quarry - resilient multi-step search and answer orchestrator

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Global .env first, then the working directory's
    quarry::config::load_dotenv();

    let cli = Cli::parse();

    // Serve logs requests; ask keeps stderr for progress lines
    let log_level = match &cli.command {
        Some(Commands::Serve { .. }) | None => Level::INFO,
        Some(Commands::Ask(args)) if args.verbose => Level::INFO,
        Some(Commands::Ask(_)) => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        None => cli::run_server(None).await?,
        Some(Commands::Serve { port }) => cli::run_server(port).await?,
        Some(Commands::Ask(args)) => cli::run_ask(args).await?,
    }

    Ok(())
}
