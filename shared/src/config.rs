use crate::{ConfigError, Result};
use std::time::Duration;
use tracing::warn;

/// Where users and sessions are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Postgres { url: String, max_connections: u32 },
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub http_port: u16,
    pub storage: Storage,
    pub session_ttl: Duration,
    /// `None` disables the background sweep of expired sessions.
    pub session_sweep_interval: Option<Duration>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    const DEFAULT_HOST: &str = "0.0.0.0";
    const DEFAULT_HTTP_PORT: u16 = 8080;
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
    const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("KEYSTONE_STORAGE")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => Storage::Postgres {
                url: lookup("DATABASE_URL")
                    .filter(|url| !url.is_empty())
                    .ok_or(ConfigError::MissingDatabaseUrl)?,
                max_connections: parse_or(
                    &lookup,
                    "KEYSTONE_DB_MAX_CONNECTIONS",
                    Self::DEFAULT_MAX_CONNECTIONS,
                ),
            },
            "memory" => Storage::Memory,
            other => return Err(ConfigError::UnknownStorage(other.to_string())),
        };

        let sweep_secs: u64 = parse_or(&lookup, "KEYSTONE_SESSION_SWEEP_SECS", 0);

        Ok(Self {
            host: lookup("KEYSTONE_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string()),
            http_port: parse_or(&lookup, "KEYSTONE_HTTP_PORT", Self::DEFAULT_HTTP_PORT),
            storage,
            session_ttl: Duration::from_secs(session_ttl_secs(&lookup)),
            session_sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            allowed_origins: lookup("KEYSTONE_ALLOWED_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

/// Session lifetime in seconds; must be positive and at most a year.
fn session_ttl_secs<F>(lookup: &F) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_or(lookup, "KEYSTONE_SESSION_TTL_SECS", Config::DEFAULT_SESSION_TTL_SECS);
    if secs == 0 || secs > Config::MAX_SESSION_TTL_SECS {
        warn!(
            "KEYSTONE_SESSION_TTL_SECS must be between 1 and {}, got {}; using default {}",
            Config::MAX_SESSION_TTL_SECS,
            secs,
            Config::DEFAULT_SESSION_TTL_SECS
        );
        return Config::DEFAULT_SESSION_TTL_SECS;
    }
    secs
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
    }
}
