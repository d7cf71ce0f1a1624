use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER: &str = "http://localhost:3000";

/// Persisted client settings; `UQL_SERVER` and `UQL_TOKEN` override the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server: String,
    pub token: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            token: None,
            updated_at: None,
        }
    }
}

impl ClientConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(server) = std::env::var("UQL_SERVER") {
            self.server = server;
        }
        if let Ok(token) = std::env::var("UQL_TOKEN") {
            self.token = Some(token).filter(|t| !t.is_empty());
        }
        self
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("UQLC_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("uqlc")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn load_client_config() -> anyhow::Result<ClientConfig> {
    let config_file = get_config_dir()?.join("client.json");

    if !config_file.exists() {
        return Ok(ClientConfig::default());
    }

    let content = fs::read_to_string(config_file)?;
    let config: ClientConfig = serde_json::from_str(&content)?;
    Ok(config)
}

pub fn save_client_config(config: &ClientConfig) -> anyhow::Result<()> {
    let config_file = get_config_dir()?.join("client.json");

    let mut config = config.clone();
    config.updated_at = Some(Utc::now());
    let content = serde_json::to_string_pretty(&config)?;
    fs::write(config_file, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_local_server() {
        let config = ClientConfig::default();
        assert_eq!(config.server, DEFAULT_SERVER);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = ClientConfig {
            server: "https://uql.example.com".to_string(),
            token: Some("abc".to_string()),
            updated_at: None,
        };
        let parsed: ClientConfig = serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(parsed.server, config.server);
        assert_eq!(parsed.token, config.token);
    }
}
