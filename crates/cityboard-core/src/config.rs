use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CityboardError, Result};
use crate::types::DashboardQuery;

/// Top-level configuration for the Cityboard client.
///
/// Loaded from `~/.cityboard/config.toml` by default. Each section corresponds
/// to one orchestrator or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CityboardConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
}

impl CityboardConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CityboardConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CityboardError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Generation model name, passed through to the endpoint verbatim.
    pub model: String,
    /// Base URL of the generation API; the model path is appended.
    pub endpoint: String,
    /// Model-authored message the transcript starts with.
    pub greeting: String,
    /// Text pre-filled into the composer when a session starts.
    pub starter: String,
    /// Text appended in place of an empty reply.
    pub empty_reply_placeholder: String,
    /// Quick prompts offered next to the composer.
    pub suggestions: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            greeting: "嗨👋 我是你的台北小助手，想知道什麼都可以問我喔！".to_string(),
            starter: "今天松山新店線捷運壅擠程度?".to_string(),
            empty_reply_placeholder: "[No content]".to_string(),
            suggestions: vec![
                "今天台北有什麼免費展覽？".to_string(),
                "怎麼從台北車站到古亭捷運站".to_string(),
                "台北市有什麼好吃的美食".to_string(),
            ],
        }
    }
}

/// Dashboard resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base URL of the dashboard REST API (usually a local proxy).
    pub base_url: String,
    /// Default city.
    pub city: String,
    /// Default dashboard index.
    pub index: String,
    /// Default component limit (clamped to 1..=12 when a query is built).
    pub limit: u32,
    /// Known city choices.
    pub cities: Vec<String>,
    /// Known index choices.
    pub indexes: Vec<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            city: "taipei".to_string(),
            index: "traffic".to_string(),
            limit: 4,
            cities: vec!["taipei".to_string(), "metrotaipei".to_string()],
            indexes: [
                "traffic",
                "metro",
                "youbike",
                "planning",
                "services",
                "disaster-prevention",
                "climate-change",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl DashboardConfig {
    /// The query described by the configured defaults.
    pub fn default_query(&self) -> DashboardQuery {
        DashboardQuery::new(&self.city, &self.index, self.limit)
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("cityboard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Remembered-credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// File backing the key-value store.
    pub store_path: String,
    /// Fixed slot name the credential is stored under.
    pub key: String,
    /// Whether a credential entered at runtime is written to the store.
    pub remember: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            store_path: "~/.cityboard/credentials.toml".to_string(),
            key: "gemini_api_key".to_string(),
            remember: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = CityboardConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.chat.model, "gemini-2.5-flash");
        assert_eq!(config.chat.empty_reply_placeholder, "[No content]");
        assert_eq!(config.chat.suggestions.len(), 3);
        assert_eq!(config.dashboard.base_url, "http://localhost:4000");
        assert_eq!(config.dashboard.city, "taipei");
        assert_eq!(config.dashboard.index, "traffic");
        assert_eq!(config.dashboard.limit, 4);
        assert_eq!(config.dashboard.indexes.len(), 7);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.credential.key, "gemini_api_key");
        assert!(config.credential.remember);
    }

    #[test]
    fn test_default_query_clamps_limit() {
        let mut dashboard = DashboardConfig::default();
        assert_eq!(
            dashboard.default_query(),
            DashboardQuery::new("taipei", "traffic", 4)
        );
        dashboard.limit = 40;
        assert_eq!(dashboard.default_query().limit, 12);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[chat]
model = "gemini-2.5-pro"
suggestions = ["one", "two"]

[dashboard]
base_url = "https://citydashboard.example"
city = "metrotaipei"
index = "metro"
limit = 8

[gateway]
timeout_secs = 5

[credential]
remember = false
"#;
        let file = create_temp_config(content);
        let config = CityboardConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.chat.model, "gemini-2.5-pro");
        assert_eq!(config.chat.suggestions, vec!["one", "two"]);
        assert_eq!(config.dashboard.base_url, "https://citydashboard.example");
        assert_eq!(config.dashboard.city, "metrotaipei");
        assert_eq!(config.dashboard.limit, 8);
        assert_eq!(config.gateway.timeout_secs, 5);
        assert!(!config.credential.remember);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[chat]
model = "gemini-2.0-flash"
"#;
        let file = create_temp_config(content);
        let config = CityboardConfig::load(file.path()).unwrap();
        assert_eq!(config.chat.model, "gemini-2.0-flash");
        // Remaining fields use defaults
        assert_eq!(config.chat.empty_reply_placeholder, "[No content]");
        assert_eq!(config.dashboard.limit, 4);
        assert_eq!(config.credential.key, "gemini_api_key");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = CityboardConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.dashboard.city, "taipei");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = CityboardConfig::load(file.path());
        assert!(matches!(result, Err(CityboardError::Config(_))));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = CityboardConfig::default();
        config.dashboard.limit = 12;
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = CityboardConfig::load(&path).unwrap();
        assert_eq!(reloaded.dashboard.limit, 12);
        assert_eq!(reloaded.chat.greeting, config.chat.greeting);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = CityboardConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.dashboard.cities, vec!["taipei", "metrotaipei"]);
    }
}
