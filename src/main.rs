use anyhow::{Context as _, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokenrelay_auth::DefaultAzureCredential;
use tokenrelay_config::Config;
use tokenrelay_proxy::AppState;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tokenrelay",
    about = "tokenrelay: forwards requests to an Entra ID protected upstream with a fresh bearer token"
)]
struct Cli {
    /// Path to a YAML configuration file. Environment variables override it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the listening port (default: 8081).
    #[arg(short, long)]
    port: Option<u16>,
    /// Override the listening address (default: 0.0.0.0).
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("config error")?;
    if let Some(p) = cli.port {
        config.port = p;
    }
    if let Some(h) = cli.host {
        config.host = h;
    }
    if config.api_key.is_none() {
        tracing::warn!("EXPECTED_KEY not set; caller authentication disabled");
    }

    let http = tokenrelay_proxy::build_http_client().context("failed to build HTTP client")?;
    let credential =
        DefaultAzureCredential::from_env(http.clone()).context("failed to create credential")?;
    tracing::debug!(sources = ?credential.source_names(), "credential chain ready");

    let addr = config.listen_addr();
    let port = config.port;
    let target = config.upstream.to_string();
    let state = AppState::new(Arc::new(config), Arc::new(credential), http);
    let app = tokenrelay_proxy::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(port, target = %target, "proxy listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
