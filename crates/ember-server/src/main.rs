//! ember - tool-calling chat server
//!
//! Loads configuration (file, then environment, then command line), builds
//! the conversation loop and serves the HTTP API.

use anyhow::Context;
use clap::Parser;
use ember_core::config::{Config, DEFAULT_CONFIG_FILE};
use ember_server::{create_router, AppState};
use std::path::PathBuf;
use tower_http::trace::TraceLayer;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "ember", version, about = "Chat completions with sandboxed local tools")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to listen on, e.g. 127.0.0.1:8765
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory the tools are confined to
    #[arg(short, long)]
    project_root: Option<PathBuf>,
}

/// Initialize tracing for logging
fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    config.apply_env();

    if let Some(bind) = &args.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(root) = &args.project_root {
        config.sandbox.project_root = Some(root.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = load_config(&args)?;
    let state = AppState::from_config(&config)?;

    let app = create_router(state)
        .layer(axum::extract::DefaultBodyLimit::max(config.server.body_limit_bytes))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    tracing::info!("ember listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
