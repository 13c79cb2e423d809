use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use circles_worker::{app, build_runtime, config::Config, middleware};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::load()?);
    middleware::init_logging(&config.logging)?;
    middleware::init_metrics().map_err(anyhow::Error::msg)?;

    info!("Starting circles worker v{}", env!("CARGO_PKG_VERSION"));

    let mut runtime = build_runtime(&config).await?;
    runtime.scheduler.start();

    let app = app::create_app(config.clone(), runtime.ctx.clone());
    let addr = config.socket_addr()?;
    info!("Health server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    runtime.scheduler.shutdown();
    runtime
        .scheduler
        .wait_for_shutdown(Duration::from_secs(config.jobs.shutdown_timeout_secs))
        .await;

    Ok(())
}
