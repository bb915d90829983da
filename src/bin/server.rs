use anyhow::Context;
use tokio::net::TcpListener;

use scopewire::settings::{EnvSource, DEFAULT_ENV_FILE};
use scopewire::{bootstrap, logging, ApiBuilder, Settings};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let source = EnvSource::from_env_file(DEFAULT_ENV_FILE).context("failed to read environment")?;
    let settings = Settings::from_source(&source).context("invalid settings")?;
    logging::init(settings.debug);

    let container = bootstrap(settings)?;
    let api = ApiBuilder::new(container).build().await?;

    let host = source.get("host").unwrap_or(DEFAULT_HOST);
    let port = source.get("port").unwrap_or(DEFAULT_PORT);
    let listener = TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;

    api.serve(listener, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
