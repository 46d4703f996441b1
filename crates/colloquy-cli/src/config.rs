use colloquy_agent::{ChatConfig, ModelConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of `colloquy.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ColloquyConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// `[chat]`: conversation settings plus where transcripts are kept.
#[derive(Debug, Default, Deserialize)]
pub struct ChatSection {
    #[serde(flatten)]
    pub settings: ChatConfig,
    /// Write-through JSONL journal directory. Unset keeps transcripts in memory only.
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
    /// Evict sessions idle this long from memory. Requires `journal_dir`.
    #[serde(default)]
    pub idle_eviction_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl ColloquyConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    /// Chat settings are validated, then empty API keys are filled from the
    /// environment.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw).map_err(|e| {
                anyhow::anyhow!("Failed to parse config file '{}': {e}", path.display())
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        };
        config
            .chat
            .settings
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {e}", path.display()))?;
        config.model.resolve_api_key_from_env();
        Ok(config)
    }

    /// Parses TOML text without consulting the environment.
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}
