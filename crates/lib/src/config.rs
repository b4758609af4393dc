//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Secrets (platform access token, AI API key) are usually supplied through the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messaging platform (TikTok Business) settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// AI chat backend settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Relay behavior (fallback text, timeouts).
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Gateway bind, port and webhook route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Route the platform delivers webhook events to (default "/webhook").
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// TikTok Business Messaging API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    /// API base URL (default "https://business-api.tiktok.com").
    #[serde(default = "default_platform_base_url")]
    pub base_url: String,

    /// Access token sent in the `Access-Token` header. Overridden by TIKTOK_ACCESS_TOKEN env.
    pub access_token: Option<String>,

    /// Business account id used when an event carries no `user_openid`.
    pub business_id: Option<String>,
}

fn default_platform_base_url() -> String {
    "https://business-api.tiktok.com".to_string()
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_base_url(),
            access_token: None,
            business_id: None,
        }
    }
}

/// AI chat backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    /// Base URL of the chat API exposing `create-chat` and `send-message`. Overridden by RELAY_AI_BASE_URL env.
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    /// Model identifier passed when creating a chat session.
    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Optional bearer token for the chat API. Overridden by RELAY_AI_API_KEY env.
    pub api_key: Option<String>,
}

fn default_ai_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_ai_model() -> String {
    "default".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            api_key: None,
        }
    }
}

/// Relay behavior: what the user sees when something goes wrong, and how long outbound calls may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Sent to the user once when the AI call or the reply delivery fails.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// Relayed when the AI backend answers successfully but in no recognized shape.
    #[serde(default = "default_degraded_reply")]
    pub degraded_reply: String,

    /// Timeout for each outbound HTTP call, in seconds (default 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Sorry, something went wrong on our side. Please try again in a moment.";

pub const DEFAULT_DEGRADED_REPLY: &str =
    "Sorry, our assistant is having trouble right now. Please try again later.";

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

fn default_degraded_reply() -> String {
    DEFAULT_DEGRADED_REPLY.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback_message(),
            degraded_reply: default_degraded_reply(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RelayConfig {
    /// Outbound request timeout; a zero setting is treated as the default.
    pub fn request_timeout(&self) -> Duration {
        let secs = if self.request_timeout_secs == 0 {
            default_request_timeout_secs()
        } else {
            self.request_timeout_secs
        };
        Duration::from_secs(secs)
    }
}

/// Read a non-empty, trimmed environment variable.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the platform access token: env TIKTOK_ACCESS_TOKEN overrides config.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    env_non_empty("TIKTOK_ACCESS_TOKEN").or_else(|| trimmed(config.platform.access_token.as_ref()))
}

/// Resolve the AI API key: env RELAY_AI_API_KEY overrides config.
pub fn resolve_ai_api_key(config: &Config) -> Option<String> {
    env_non_empty("RELAY_AI_API_KEY").or_else(|| trimmed(config.ai.api_key.as_ref()))
}

/// Resolve the AI base URL: env RELAY_AI_BASE_URL overrides config.
pub fn resolve_ai_base_url(config: &Config) -> String {
    env_non_empty("RELAY_AI_BASE_URL").unwrap_or_else(|| config.ai.base_url.trim().to_string())
}

/// Fallback business id from config, if set and non-empty.
pub fn resolve_business_id(config: &Config) -> Option<String> {
    trimmed(config.platform.business_id.as_ref())
}

/// Normalize the configured webhook path so it always starts with '/'. The root is reserved for
/// the health check.
pub fn webhook_path(config: &Config) -> String {
    let p = config.gateway.webhook_path.trim();
    if p.is_empty() || p == "/" {
        default_webhook_path()
    } else if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{}", p)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or RELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 3000);
        assert_eq!(g.bind, "127.0.0.1");
        assert_eq!(g.webhook_path, "/webhook");
    }

    #[test]
    fn empty_object_parses_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.platform.base_url, "https://business-api.tiktok.com");
        assert_eq!(config.ai.model, "default");
        assert_eq!(config.relay.fallback_message, DEFAULT_FALLBACK_MESSAGE);
        assert_eq!(config.relay.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn camel_case_keys_are_read() {
        let config: Config = serde_json::from_str(
            r#"{
                "gateway": { "webhookPath": "hooks/tiktok" },
                "platform": { "businessId": "biz-1" },
                "ai": { "baseUrl": "http://ai.local/", "model": "gpt-x" },
                "relay": { "fallbackMessage": "oops", "requestTimeoutSecs": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(webhook_path(&config), "/hooks/tiktok");
        assert_eq!(resolve_business_id(&config).as_deref(), Some("biz-1"));
        assert_eq!(config.ai.model, "gpt-x");
        assert_eq!(config.relay.fallback_message, "oops");
        assert_eq!(config.relay.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn root_webhook_path_is_replaced() {
        let mut config = Config::default();
        config.gateway.webhook_path = "/".to_string();
        assert_eq!(webhook_path(&config), "/webhook");
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let mut config = Config::default();
        config.relay.request_timeout_secs = 0;
        assert_eq!(config.relay.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn blank_business_id_is_ignored() {
        let mut config = Config::default();
        config.platform.business_id = Some("   ".to_string());
        assert_eq!(resolve_business_id(&config), None);
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("relay-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 3000);
    }
}
