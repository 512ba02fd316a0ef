use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Runtime configuration, read from `docsmith.toml` in the workspace dir.
/// Every field has a default so a missing file means a working local setup.
/// Secrets (API keys) come from the environment, never the file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub web_search: WebSearchProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Six-field cron expression for the background tick.
    #[serde(default = "default_cron")]
    pub cron: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EmailConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebSearchProviderConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7870
}
fn default_max_turns() -> usize {
    8
}
fn default_batch_size() -> usize {
    16
}
fn default_cron() -> String {
    // Every 30 seconds.
    "*/30 * * * * *".to_string()
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_secs() -> u64 {
    30
}
fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            cron: default_cron(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(workspace_dir: P) -> Result<Self> {
        let config_path = workspace_dir.as_ref().join("docsmith.toml");
        if !config_path.exists() {
            info!("No docsmith.toml found, using defaults.");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7870);
        assert_eq!(config.agent.max_turns, 8);
        assert_eq!(config.worker.batch_size, 16);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert!(config.web_search.endpoint.is_none());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            r#"
            [agent]
            max_turns = 12

            [worker]
            cron = "0 * * * * *"
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.max_turns, 12);
        assert_eq!(config.worker.cron, "0 * * * * *");
        assert_eq!(config.worker.batch_size, 16);
        assert_eq!(config.server.port, 7870);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).await.unwrap();
        assert_eq!(config.agent.max_turns, 8);
    }

    #[tokio::test]
    async fn file_on_disk_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("docsmith.toml"),
            "[server]\nport = 9999\n",
        )
        .await
        .unwrap();
        let config = Config::load(dir.path()).await.unwrap();
        assert_eq!(config.server.port, 9999);
    }
}
