use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::wechat::DEFAULT_BASE_URL;

/// Complete wechat-mcp configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WechatMcpConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Transport served by the `mcp` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Stdio,
    Sse,
}

impl std::fmt::Display for ServerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerMode::Stdio => write!(f, "stdio"),
            ServerMode::Sse => write!(f, "sse"),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub mode: ServerMode,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `*` or a comma-separated origin list (SSE only)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::default(),
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Local database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Base64 32-byte key; secrets are stored in plaintext without one
    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_database_path() -> String {
    "data/wechat-mcp.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            encryption_key: None,
        }
    }
}

/// Token lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Tokens are refreshed this many seconds before they expire
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_seconds: i64,
}

fn default_refresh_skew() -> i64 {
    300
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_skew_seconds: default_refresh_skew(),
        }
    }
}

/// WeChat API endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Tool selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    /// Tool names to expose; empty exposes every tool
    #[serde(default)]
    pub enabled: Vec<String>,
}

impl WechatMcpConfig {
    /// Applies environment overrides, ignoring values that do not parse.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("WECHAT_MCP_SECRET_KEY") {
            if !v.trim().is_empty() {
                self.storage.encryption_key = Some(v.trim().to_string());
            }
        }
        if let Some(v) = lookup("CORS_ORIGIN") {
            self.server.cors_origin = v;
        }
        if let Some(v) = lookup("WECHAT_MCP_REFRESH_SKEW_SECONDS") {
            if let Ok(n) = v.parse::<i64>() {
                self.auth.refresh_skew_seconds = n;
            }
        }
        if let Some(v) = lookup("WECHAT_API_BASE_URL") {
            self.api.base_url = v;
        }
    }
}

/// Load configuration from an optional TOML file, then apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<WechatMcpConfig> {
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => WechatMcpConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = WechatMcpConfig::default();
        assert_eq!(config.server.mode, ServerMode::Stdio);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.cors_origin, "*");
        assert_eq!(config.storage.database_path, "data/wechat-mcp.db");
        assert!(config.storage.encryption_key.is_none());
        assert_eq!(config.auth.refresh_skew_seconds, 300);
        assert_eq!(config.api.base_url, "https://api.weixin.qq.com");
        assert_eq!(config.api.timeout_seconds, 30);
        assert!(config.tools.enabled.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            mode = "sse"
            host = "0.0.0.0"
            port = 8080
            cors_origin = "https://a.example,https://b.example"

            [storage]
            database_path = "/var/lib/wechat-mcp/state.db"

            [auth]
            refresh_skew_seconds = 120

            [api]
            base_url = "http://localhost:9000"
            timeout_seconds = 5

            [tools]
            enabled = ["wechat_auth", "wechat_menu"]
        "#;

        let config: WechatMcpConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.mode, ServerMode::Sse);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.database_path, "/var/lib/wechat-mcp/state.db");
        assert_eq!(config.auth.refresh_skew_seconds, 120);
        assert_eq!(config.api.timeout_seconds, 5);
        assert_eq!(config.tools.enabled, vec!["wechat_auth", "wechat_menu"]);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [server]
            port = 4000
        "#;

        let config: WechatMcpConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.auth.refresh_skew_seconds, 300);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WECHAT_MCP_SECRET_KEY", "a2V5"),
            ("CORS_ORIGIN", "https://app.example"),
            ("WECHAT_MCP_REFRESH_SKEW_SECONDS", "not-a-number"),
            ("WECHAT_API_BASE_URL", "http://mock:1234"),
        ]
        .into_iter()
        .collect();

        let mut config = WechatMcpConfig::default();
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.storage.encryption_key.as_deref(), Some("a2V5"));
        assert_eq!(config.server.cors_origin, "https://app.example");
        assert_eq!(config.auth.refresh_skew_seconds, 300);
        assert_eq!(config.api.base_url, "http://mock:1234");
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wechat-mcp.toml");
        std::fs::write(&path, "[auth]\nrefresh_skew_seconds = 60\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.auth.refresh_skew_seconds, 60);

        let missing = load_config(Some(&dir.path().join("missing.toml")));
        assert!(missing.is_err());
    }
}
