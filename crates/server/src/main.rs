use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod api;
mod config;
mod transport;
mod ui;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "dossier")]
#[command(about = "MCP connector serving user-directory search and fetch tools", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "dossier.toml", env = "DOSSIER_CONFIG")]
    config: PathBuf,

    /// JSON file with user records (overrides store.records_file)
    #[arg(short, long, env = "DOSSIER_RECORDS")]
    records: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "DOSSIER_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "DOSSIER_HOST")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dossier=info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting dossier MCP server");

    // Load configuration
    let mut config = ServerConfig::load(&args.config)?;
    if let Some(records) = args.records {
        tracing::info!("Records file: {}", records.display());
        config.store.records_file = Some(records);
    }

    // Start API server
    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr, config).await?;

    Ok(())
}
