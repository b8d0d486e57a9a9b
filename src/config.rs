use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::common::Session;
use crate::error::ConfigError;
use crate::network::Backoff;

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";

pub const ENV_BASE_URL: &str = "CHAT_BASE_URL";
pub const ENV_WS_URL: &str = "CHAT_WS_URL";
pub const ENV_USERNAME: &str = "CHAT_USERNAME";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base of the REST api, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Host of the live channel; derived from `base_url` when unset.
    pub ws_url: Option<String>,
    pub ws_path: String,
    pub username: String,
    pub nickname: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub history_retry: BackoffConfig,
    pub reconnect: BackoffConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            ws_url: None,
            ws_path: "/chat/ws".to_string(),
            username: String::new(),
            nickname: String::new(),
            page_size: 10,
            request_timeout_secs: 10,
            handshake_timeout_secs: 10,
            history_retry: BackoffConfig {
                max_attempts: Some(3),
                initial_delay_ms: 500,
                max_delay_ms: 4_000,
            },
            reconnect: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// `None` keeps trying forever.
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_attempts,
        )
    }
}

impl AppConfig {
    /// Applies `CHAT_*` environment variables on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_BASE_URL).ok(),
            std::env::var(ENV_WS_URL).ok(),
            std::env::var(ENV_USERNAME).ok(),
        );
    }

    pub fn apply_overrides(
        &mut self,
        base_url: Option<String>,
        ws_url: Option<String>,
        username: Option<String>,
    ) {
        if let Some(base_url) = base_url.filter(|value| !value.trim().is_empty()) {
            self.base_url = base_url;
        }
        if let Some(ws_url) = ws_url.filter(|value| !value.trim().is_empty()) {
            self.ws_url = Some(ws_url);
        }
        if let Some(username) = username.filter(|value| !value.trim().is_empty()) {
            self.username = username;
        }
    }

    pub fn session(&self) -> Result<Session, ConfigError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        let nickname = if self.nickname.trim().is_empty() {
            username
        } else {
            self.nickname.trim()
        };
        Ok(Session::new(username, nickname))
    }

    pub fn api_base(&self) -> Result<Url, ConfigError> {
        parse_base(&self.base_url)
    }

    /// WebSocket endpoint for the live channel (without the room query).
    pub fn channel_endpoint(&self) -> Result<Url, ConfigError> {
        let mut url = match &self.ws_url {
            Some(ws_url) => parse_base(ws_url)?,
            None => parse_base(&self.base_url)?,
        };

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ConfigError::InvalidBaseUrl {
                    url: url.to_string(),
                    reason: format!("unsupported scheme `{other}`"),
                });
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::InvalidBaseUrl {
                url: url.to_string(),
                reason: "cannot switch to a websocket scheme".to_string(),
            })?;
        url.set_path(&self.ws_path);
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

fn parse_base(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}
