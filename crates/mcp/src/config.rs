// Tool settings shared by every transport, read from `dossier.toml`

use crate::tools::ToolSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `[tools]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_results() -> usize {
    10
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_results: default_max_results(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            anyhow::bail!("tools.timeout_ms must be greater than zero");
        }
        if self.max_results == 0 {
            anyhow::bail!("tools.max_results must be greater than zero");
        }
        Ok(())
    }

    pub fn settings(&self, public_url: &str) -> ToolSettings {
        ToolSettings {
            public_url: public_url.to_string(),
            max_results: self.max_results,
        }
    }
}

/// The parts of `dossier.toml` the stdio server uses. Other sections are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StdioConfig {
    #[serde(default)]
    pub server: PublicUrlConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub store: RecordsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicUrlConfig {
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for PublicUrlConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordsConfig {
    #[serde(default)]
    pub records_file: Option<PathBuf>,
}

impl StdioConfig {
    /// Load the file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = if path.exists() {
            let content =
                std::fs::read_to_string(path).context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            Self::default()
        };

        config.tools.validate()?;
        Ok(config)
    }

    pub fn tool_settings(&self) -> ToolSettings {
        self.tools.settings(&self.server.public_url)
    }
}
