use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use intellisearch::api::create_router;
use intellisearch::config::CONFIG;
use intellisearch::gateway::AnswerGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default `info` level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = match &*CONFIG {
        Ok(config) => config.clone(),
        Err(e) => anyhow::bail!("{:#}", e),
    };
    tracing::info!(?config, "configuration loaded");

    let gateway = Arc::new(AnswerGateway::from_config(&config)?);
    let app = create_router(gateway, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
