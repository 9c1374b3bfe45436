use crate::transport::SessionTable;
use anyhow::{Context, Result};
use dossier_core::storage::{InMemoryRecordStore, RecordStore};
use dossier_mcp::config::ToolsConfig;
use dossier_mcp::tools::{standard_registry, ToolSettings};
use dossier_mcp::{Dispatcher, McpServer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smallest outbound queue that still fits the connection handshake
const MIN_QUEUE_CAPACITY: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Externally visible base URL, used in record citation links
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Bound on queued outbound events per session
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Close sessions without inbound traffic for this long; 0 disables
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file with the user records; built-in samples when unset
    #[serde(default)]
    pub records_file: Option<PathBuf>,
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    64
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            queue_capacity: default_queue_capacity(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl StreamConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.heartbeat_secs == 0 {
            anyhow::bail!("stream.heartbeat_secs must be greater than zero");
        }
        if self.stream.queue_capacity < MIN_QUEUE_CAPACITY {
            anyhow::bail!("stream.queue_capacity must be at least {}", MIN_QUEUE_CAPACITY);
        }
        self.tools.validate()
    }

    pub fn tool_settings(&self) -> ToolSettings {
        self.tools.settings(&self.server.public_url)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub mcp: Arc<McpServer>,
    pub store: Arc<dyn RecordStore>,
    pub sessions: SessionTable,
    pub stream: StreamConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match &config.store.records_file {
            Some(path) => Arc::new(
                InMemoryRecordStore::from_json_file(path).context("Failed to load record store")?,
            ),
            None => {
                tracing::info!("No records file configured, serving sample records");
                Arc::new(InMemoryRecordStore::with_samples())
            }
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: &ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        let registry = Arc::new(standard_registry(store.clone(), config.tool_settings()));
        let dispatcher = Arc::new(Dispatcher::new(registry, config.tools.timeout()));

        Self {
            mcp: Arc::new(McpServer::new(dispatcher)),
            store,
            sessions: SessionTable::new(),
            stream: config.stream.clone(),
            started_at: Instant::now(),
        }
    }

    /// Number of records served, or `None` when the store cannot answer
    pub async fn record_count(&self) -> Option<usize> {
        match self.store.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Failed to count records: {:#}", e);
                None
            }
        }
    }
}
