//! Configuration module - environment variable and query string parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::util::rate_limit::RELAY_WRITE_RATE_LIMIT;
use crate::util::time::{fps_to_interval, DEFAULT_SIMULATION_FPS, DEFAULT_UPLOAD_FPS};

/// Which half of the system this process runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Headless arena client
    Client,
    /// Development relay server
    Relay,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Relay store the client talks to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayBackend {
    /// In-process store, for solo runs and tests
    Memory,
    /// REST + event-stream relay at this base URL
    Http { base_url: String },
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub role: Role,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,

    pub relay: RelayBackend,
    /// Auth token appended to relay requests
    pub relay_auth: Option<String>,
    /// Bind address of the development relay
    pub relay_bind: SocketAddr,
    /// Write quota of the HTTP relay client
    pub relay_writes_per_sec: u32,

    /// File holding the persisted device id
    pub device_id_path: PathBuf,

    pub shadows: bool,
    pub simulation_interval: Duration,
    pub upload_interval: Duration,

    /// RNG seed for spawns and the scripted input
    pub seed: Option<u64>,
    pub viewport: (u32, u32),
    /// `None` disables mirror eviction
    pub mirror_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let role = match lookup("ARENA_ROLE").as_deref() {
            None | Some("client") => Role::Client,
            Some("relay") => Role::Relay,
            Some(other) => return Err(ConfigError::invalid("ARENA_ROLE", other)),
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::invalid("LOG_FORMAT", other)),
        };

        let relay_url = lookup("RELAY_URL").unwrap_or_else(|| "memory://".to_string());
        let relay = parse_relay_url(&relay_url)?;

        let relay_bind = lookup("RELAY_BIND")
            .unwrap_or_else(|| "0.0.0.0:9000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddress)?;

        let viewport = (
            parse_or("VIEWPORT_WIDTH", lookup("VIEWPORT_WIDTH"), 1280)?,
            parse_or("VIEWPORT_HEIGHT", lookup("VIEWPORT_HEIGHT"), 720)?,
        );
        if viewport.0 == 0 || viewport.1 == 0 {
            return Err(ConfigError::invalid(
                "VIEWPORT_WIDTH",
                &format!("{}x{}", viewport.0, viewport.1),
            ));
        }

        let mirror_timeout_ms: u64 =
            parse_or("MIRROR_TIMEOUT_MS", lookup("MIRROR_TIMEOUT_MS"), 10_000)?;

        let mut config = Self {
            role,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            relay,
            relay_auth: lookup("RELAY_AUTH").filter(|s| !s.is_empty()),
            relay_bind,
            relay_writes_per_sec: parse_or(
                "RELAY_WRITES_PER_SEC",
                lookup("RELAY_WRITES_PER_SEC"),
                RELAY_WRITE_RATE_LIMIT,
            )?,
            device_id_path: lookup("DEVICE_ID_PATH")
                .unwrap_or_else(|| ".arena_device_id".to_string())
                .into(),
            shadows: true,
            simulation_interval: fps_to_interval(DEFAULT_SIMULATION_FPS),
            upload_interval: fps_to_interval(DEFAULT_UPLOAD_FPS),
            seed: lookup("ARENA_SEED")
                .map(|raw| {
                    raw.parse()
                        .map_err(|_| ConfigError::invalid("ARENA_SEED", &raw))
                })
                .transpose()?,
            viewport,
            mirror_timeout: (mirror_timeout_ms > 0)
                .then(|| Duration::from_millis(mirror_timeout_ms)),
        };

        if let Some(query) = lookup("ARENA_QUERY") {
            config.apply_query(&query)?;
        }
        Ok(config)
    }

    /// Apply page-style query parameters: `shadows`, `fps`, `uploadfps`
    pub fn apply_query(&mut self, query: &str) -> Result<(), ConfigError> {
        let query = query.trim_start_matches('?');
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "shadows" => {
                    self.shadows = match value {
                        "true" | "1" | "on" | "" => true,
                        "false" | "0" | "off" => false,
                        other => return Err(ConfigError::invalid("shadows", other)),
                    }
                }
                "fps" => {
                    self.simulation_interval = fps_to_interval(parse_fps("fps", value)?);
                }
                "uploadfps" => {
                    self.upload_interval = fps_to_interval(parse_fps("uploadfps", value)?);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_relay_url(raw: &str) -> Result<RelayBackend, ConfigError> {
    if raw == "memory://" || raw == "memory" {
        Ok(RelayBackend::Memory)
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(RelayBackend::Http {
            base_url: raw.trim_end_matches('/').to_string(),
        })
    } else {
        Err(ConfigError::invalid("RELAY_URL", raw))
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::invalid(key, &raw)),
    }
}

fn parse_fps(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    match raw.parse::<u32>() {
        Ok(fps) if fps > 0 => Ok(fps),
        _ => Err(ConfigError::invalid(key, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing value for {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid relay bind address format")]
    InvalidAddress,
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
        }
    }
}
