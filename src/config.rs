use log::warn;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::stream::DEFAULT_ANALYSIS_TOOL;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url {url}: {message}")]
    Url { url: String, message: String },
}

/// Client settings. Every field has a default, so a config file only needs
/// the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub reconnect_attempts: u32,
    pub reconnect_interval_ms: u64,
    pub analysis_tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".into(),
            ws_base_url: "ws://localhost:8000/api".into(),
            reconnect_attempts: 10,
            reconnect_interval_ms: 3000,
            analysis_tool: DEFAULT_ANALYSIS_TOOL.into(),
            token: None,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Defaults overridden by `DOCCHAT_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var("DOCCHAT_API_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = var("DOCCHAT_WS_URL") {
            self.ws_base_url = url;
        }
        if let Some(token) = var("DOCCHAT_TOKEN").filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        if let Some(raw) = var("DOCCHAT_RECONNECT_ATTEMPTS") {
            match raw.parse() {
                Ok(attempts) => self.reconnect_attempts = attempts,
                Err(_) => warn!("Ignoring invalid DOCCHAT_RECONNECT_ATTEMPTS={}", raw),
            }
        }
        if let Some(raw) = var("DOCCHAT_RECONNECT_INTERVAL_MS") {
            match raw.parse() {
                Ok(ms) => self.reconnect_interval_ms = ms,
                Err(_) => warn!("Ignoring invalid DOCCHAT_RECONNECT_INTERVAL_MS={}", raw),
            }
        }
        self
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// `{ws_base_url}/chat/ws/{conversation_id}?token={token}`
    pub fn ws_url(&self, conversation_id: &str, token: &str) -> Result<Url, ConfigError> {
        let mut url = self.base(&self.ws_base_url)?;
        push_segments(&mut url, &["chat", "ws", conversation_id])?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// `{api_base_url}/{segments...}`
    pub fn api_url(&self, segments: &[&str]) -> Result<Url, ConfigError> {
        let mut url = self.base(&self.api_base_url)?;
        push_segments(&mut url, segments)?;
        Ok(url)
    }

    fn base(&self, raw: &str) -> Result<Url, ConfigError> {
        Url::parse(raw).map_err(|e| ConfigError::Url {
            url: raw.to_string(),
            message: e.to_string(),
        })
    }
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<(), ConfigError> {
    let raw = url.to_string();
    url.path_segments_mut()
        .map_err(|_| ConfigError::Url {
            url: raw,
            message: "cannot be a base url".into(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_ws_url_embeds_conversation_and_token() {
        let config = ClientConfig::default();
        let url = config.ws_url("42", "abc.def").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/chat/ws/42?token=abc.def");

        let config = ClientConfig {
            ws_base_url: "wss://chat.example.com/api/".into(),
            ..ClientConfig::default()
        };
        let url = config.ws_url("a b", "t").unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/api/chat/ws/a%20b?token=t");
    }

    #[test]
    fn test_api_url() {
        let config = ClientConfig::default();
        let url = config.api_url(&["chat", "conversations", "7", "title"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/chat/conversations/7/title");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"reconnect_attempts": 3, "token": "xyz"}"#).unwrap();
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.reconnect_interval(), Duration::from_secs(3));
        assert_eq!(config.token.as_deref(), Some("xyz"));
        assert_eq!(config.analysis_tool, "analyze_documents");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DOCCHAT_WS_URL", "ws://10.0.0.2:9000/api"),
            ("DOCCHAT_RECONNECT_ATTEMPTS", "2"),
            ("DOCCHAT_RECONNECT_INTERVAL_MS", "soon"),
            ("DOCCHAT_TOKEN", ""),
        ]);
        let config = ClientConfig::default().with_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.ws_base_url, "ws://10.0.0.2:9000/api");
        assert_eq!(config.reconnect_attempts, 2);
        assert_eq!(config.reconnect_interval_ms, 3000);
        assert_eq!(config.token, None);
    }

    #[test]
    fn test_from_env_starts_from_defaults() {
        let config = ClientConfig::from_env();
        assert_eq!(config, ClientConfig::default().with_env());
        assert_eq!(config.analysis_tool, "analyze_documents");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load(Path::new("/nonexistent/docchat.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
