//! Configuration loading from a TOML file and environment variables.

use crate::peer::types::{IceServerKind, ServerConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub signaling: SignalingConfig,

    #[serde(default)]
    pub peer: PeerConfig,
}

/// Network settings for the signaling HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "avatar_rtc=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalingConfig {
    /// Idle time after which a session queue is evicted; 0 keeps sessions
    /// for the process lifetime.
    #[serde(default)]
    pub session_ttl_secs: u64,

    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

/// Settings for a peer session.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Root URL of the signaling server used by [`HttpTransport`](crate::signaling::HttpTransport).
    #[serde(default = "default_signaling_url")]
    pub signaling_url: String,

    #[serde(default = "default_data_channel_label")]
    pub data_channel_label: String,

    #[serde(default = "default_true")]
    pub audio: bool,

    #[serde(default)]
    pub video: bool,

    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<ServerConfig>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prune_interval() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    500
}

fn default_signaling_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_data_channel_label() -> String {
    "expressionData".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::stun("stun:stun.l.google.com:19302"),
        ServerConfig::stun("stun:stun1.l.google.com:19302"),
    ]
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 0,
            prune_interval_secs: default_prune_interval(),
        }
    }
}

impl SignalingConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            signaling_url: default_signaling_url(),
            data_channel_label: default_data_channel_label(),
            audio: true,
            video: false,
            ice_servers: default_ice_servers(),
        }
    }
}

impl PeerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid ICE server {url:?}: {reason}")]
    IceServer { url: String, reason: &'static str },
}

/// Rejects empty URLs and TURN entries without credentials.
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<(), ConfigError> {
    for server in servers {
        if server.url.trim().is_empty() {
            return Err(ConfigError::IceServer {
                url: server.url.clone(),
                reason: "URL cannot be empty",
            });
        }
        if server.kind == IceServerKind::Turn
            && (server.username.is_none() || server.credential.is_none())
        {
            return Err(ConfigError::IceServer {
                url: server.url.clone(),
                reason: "TURN servers require username and credential",
            });
        }
    }
    Ok(())
}

/// Parses configuration text and validates it.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents)?;
    validate_ice_servers(&config.peer.ice_servers)?;
    Ok(config)
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `AVATAR_RTC_HOST` overrides `server.host`
/// - `AVATAR_RTC_PORT` overrides `server.port`
/// - `AVATAR_RTC_LOG_LEVEL` overrides `logging.level`
/// - `AVATAR_RTC_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `AVATAR_RTC_SESSION_TTL` overrides `signaling.session_ttl_secs`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read, parsed or
/// validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(parsed) = var("AVATAR_RTC_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = var("AVATAR_RTC_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(level) = var("AVATAR_RTC_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("AVATAR_RTC_LOG_JSON") {
        config.logging.json = json.eq_ignore_ascii_case("true") || json == "1";
    }
    if let Some(parsed) = var("AVATAR_RTC_SESSION_TTL").and_then(|v| v.parse().ok()) {
        config.signaling.session_ttl_secs = parsed;
    }
}
