use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Where favorites come from and which host a song link must point at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_favorites_url")]
    pub favorites_url: String,
    /// Songs whose link host differs from this are refused.
    #[serde(default = "default_expected_host")]
    pub expected_host: String,
    /// Raw `Cookie` header value of a logged-in browser session.  Without it
    /// the site answers 401/403 and every play attempt asks the user to log in.
    #[serde(default)]
    pub session_cookie: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Overrides the platform opener (`xdg-open`, `open`, `start`).
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            favorites_url: default_favorites_url(),
            expected_host: default_expected_host(),
            session_cookie: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ControlConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn default_favorites_url() -> String {
    "https://www.songsterr.com/a/wa/favorites".to_string()
}

fn default_expected_host() -> String {
    "www.songsterr.com".to_string()
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_history_capacity() -> usize {
    10
}

fn default_duration_ms() -> u64 {
    3000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::CONTROL_TCP_PORT
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &std::path::Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            cache: CacheConfig::default(),
            notifications: NotificationConfig::default(),
            control: ControlConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}
