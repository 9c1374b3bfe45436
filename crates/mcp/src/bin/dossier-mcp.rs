// Standalone MCP server binary (JSON-RPC over stdio)

use anyhow::Result;
use dossier_core::storage::{InMemoryRecordStore, RecordStore};
use dossier_mcp::config::StdioConfig;
use dossier_mcp::tools::standard_registry;
use dossier_mcp::{Dispatcher, McpServer};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::info!("Dossier MCP Server starting...");

    let config_path = std::env::var("DOSSIER_CONFIG").unwrap_or_else(|_| "dossier.toml".to_string());
    let mut config = StdioConfig::load(Path::new(&config_path))?;
    if let Ok(records) = std::env::var("DOSSIER_RECORDS") {
        config.store.records_file = Some(PathBuf::from(records));
    }
    if let Ok(public_url) = std::env::var("DOSSIER_PUBLIC_URL") {
        config.server.public_url = public_url;
    }

    let store: Arc<dyn RecordStore> = match &config.store.records_file {
        Some(path) => Arc::new(InMemoryRecordStore::from_json_file(path)?),
        None => {
            tracing::info!("No records file configured, serving sample records");
            Arc::new(InMemoryRecordStore::with_samples())
        }
    };

    let registry = Arc::new(standard_registry(store, config.tool_settings()));
    tracing::info!("Registered {} tools", registry.len());

    let dispatcher = Arc::new(Dispatcher::new(registry, config.tools.timeout()));
    let server = McpServer::new(dispatcher);
    server.serve_stdio().await?;

    Ok(())
}
