use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mg_domain::config::Config;
use mg_gateway::{api, bootstrap};

#[derive(Parser)]
#[command(name = "meshgate", about = "Gateway for LLM agents and edge daemons")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway: serve the edge WebSocket endpoint.
    Serve {
        /// Path to the TOML config file.
        #[arg(long, default_value = "meshgate.toml")]
        config: PathBuf,
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,
        /// Override the configured bind port.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MESHGATE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config, host, port } => serve(config, host, port).await,
    }
}

async fn serve(config_path: PathBuf, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load(&config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let bind = format!("{}:{}", config.server.host, config.server.port);

    // Model providers are external adapters; the serve command starts the
    // edge plane only. Embedders inject providers via `build_state`.
    let state = bootstrap::build_state(config, Vec::new(), None)?;
    let _sweeper = bootstrap::spawn_stale_sweeper(&state);

    let router = api::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(addr = %bind, "meshgate listening");
    axum::serve(listener, router).await?;
    Ok(())
}
