//! Server Configuration
//!
//! Configuration comes from environment variables with sensible defaults;
//! a malformed value falls back to its default. The four knobs:
//!
//! | Variable | Effect | Default |
//! |---|---|---|
//! | `REDIS_HOST` | bind address | `localhost` |
//! | `REDIS_PORT` | TCP port | `6379` |
//! | `REDIS_MAX_CONNECTIONS` | active-connection cap | `1000` |
//! | `REDIS_EXPIRATION_CHECK_INTERVAL` | reaper period in seconds | `1` |

use std::time::Duration;

/// Effective server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the TCP listener on
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Active-connection cap; connections beyond it are closed at accept
    pub max_connections: usize,
    /// Period between expiration reaper sweeps
    pub expiration_check_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            max_connections: 1000,
            expiration_check_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            host: env_string("REDIS_HOST").unwrap_or(defaults.host),
            port: env_parse("REDIS_PORT").unwrap_or(defaults.port),
            max_connections: env_parse("REDIS_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            expiration_check_interval: env_parse("REDIS_EXPIRATION_CHECK_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.expiration_check_interval),
        }
    }

    /// The listener bind address, `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.parse().ok()
}
