use std::{collections::HashMap, fs};

use serde::Deserialize;

/// Settings for the HTTP gateway. Defaults are overridden first by an
/// optional `client.toml` next to the binary, then by environment
/// variables.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Upper bound for one request, sized above the server's long-poll
    /// wait window.
    pub poll_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36".into(),
            poll_timeout_secs: 60,
        }
    }
}

pub fn load_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();

    if let Ok(raw) = fs::read_to_string("client.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("base_url") {
                config.base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("user_agent") {
                config.user_agent = v.clone();
            }
            if let Some(v) = file_cfg.get("poll_timeout_secs") {
                if let Ok(secs) = v.parse() {
                    config.poll_timeout_secs = secs;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("CLIENT_BASE_URL") {
        config.base_url = v;
    }
    if let Ok(v) = std::env::var("CLIENT_USER_AGENT") {
        config.user_agent = v;
    }
    if let Ok(v) = std::env::var("CLIENT_POLL_TIMEOUT_SECS") {
        if let Ok(secs) = v.parse() {
            config.poll_timeout_secs = secs;
        }
    }

    config
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
