//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::rooms::MAX_ROOM_CAPACITY;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated
    pub client_origin: String,
    /// Capacity for rooms created without an explicit `maxPlayers`
    pub default_max_players: u32,
    /// Seconds counted down before a game starts
    pub countdown_secs: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let default_max_players = parse_or("DEFAULT_MAX_PLAYERS", 8u32)?;
        if default_max_players == 0 || default_max_players > MAX_ROOM_CAPACITY {
            return Err(ConfigError::Invalid("DEFAULT_MAX_PLAYERS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            default_max_players,
            countdown_secs: parse_or("COUNTDOWN_SECS", 3)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: "http://localhost:3000".to_string(),
            default_max_players: 8,
            countdown_secs: 3,
        }
    }
}

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://localhost:8080`
    pub server_url: String,
    /// Delay before reconnecting a dropped messaging channel
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url =
            env::var("APPLE_SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
            return Err(ConfigError::Invalid("APPLE_SERVER_URL"));
        }

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            reconnect_delay: Duration::from_millis(parse_or("RECONNECT_DELAY_MS", 5000u64)?),
        })
    }

    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            reconnect_delay: Duration::from_millis(5000),
        }
    }

    /// Base URL of the REST room directory
    pub fn api_base(&self) -> String {
        format!("{}/api", self.server_url)
    }

    /// WebSocket URL for a given user
    pub fn ws_url(&self, user_id: &str) -> String {
        let base = self
            .server_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws?userId={}", base, user_id)
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_urls_derive_from_base() {
        let config = ClientConfig::new("https://apples.example.com/");
        assert_eq!(config.api_base(), "https://apples.example.com/api");
        assert_eq!(
            config.ws_url("GUEST_12345"),
            "wss://apples.example.com/ws?userId=GUEST_12345"
        );

        let local = ClientConfig::new("http://127.0.0.1:9000");
        assert_eq!(local.ws_url("u"), "ws://127.0.0.1:9000/ws?userId=u");
        assert_eq!(local.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn server_defaults() {
        let config = Config::default();
        assert_eq!(config.default_max_players, 8);
        assert_eq!(config.countdown_secs, 3);
    }
}
