// crates/quarry-server/src/cli/serve.rs
// HTTP server startup

use anyhow::Result;
use quarry::config::Config;
use quarry::web::{self, state::AppState};
use tracing::info;

pub async fn run_server(port: Option<u16>) -> Result<()> {
    let config = Config::load();
    let port = port.unwrap_or(config.env.port);

    let state = AppState::from_config(&config)?;
    info!(
        reasoning_model = config.reasoning_model(),
        fast_model = config.fast_model(),
        pro_mode = config.env.pro_mode,
        "Providers configured"
    );

    let app = web::create_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Quarry running on http://localhost:{}", port);
    eprintln!("Quarry running on http://localhost:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
