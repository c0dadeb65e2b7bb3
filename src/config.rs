use crate::error::{Result, ScrapeError};
use std::collections::HashSet;
use std::env;
use std::time::Duration;
use url::Url;

/// Tor SOCKS ports used when `CIRCUIT_PORTS` is not set
pub const DEFAULT_CIRCUIT_PORTS: &[u16] = &[9050, 9052, 9053, 9054, 9055, 9056, 9057, 9058, 9059, 9060];

// Upper bounds for numeric settings; interval arithmetic stays in range below these.
const MAX_COOLDOWN_HOURS: u64 = 10 * 365 * 24;
const MAX_REFRESH_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
const MAX_EVICTION_INTERVAL_HOURS: u64 = 365 * 24;
const MAX_TIMEOUT_SECS: u64 = 60 * 60;
const MAX_ADMISSION_ATTEMPTS: u64 = 1024;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Circuit pool configuration
    pub circuits: CircuitConfig,
    /// Cooldown and background scheduling
    pub rotation: RotationConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 5055)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Host the circuit SOCKS listeners are bound on
    pub host: String,
    /// One SOCKS port per circuit, in rotation order
    pub ports: Vec<u16>,
    /// Page fetch timeout in seconds
    pub fetch_timeout: u64,
    /// Public address lookup timeout in seconds
    pub resolve_timeout: u64,
    /// Endpoint returning `{"ip": "..."}` for the caller
    pub ip_echo_url: String,
}

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// How long an (address, domain) pair stays in cooldown
    pub cooldown_hours: u64,
    /// Upper bound on candidates tried per request
    pub max_admission_attempts: u32,
    /// Minutes between public address refreshes
    pub refresh_interval_minutes: u64,
    /// Hours between ledger evictions
    pub eviction_interval_hours: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path of the SQLite ledger file
    pub path: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl RotationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_hours.saturating_mul(60 * 60))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60))
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_hours.saturating_mul(60 * 60))
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: 24,
            max_admission_attempts: 5,
            refresh_interval_minutes: 10,
            eviction_interval_hours: 24,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config {
            api: ApiServerConfig {
                port: get_env_or("SCRAPE_PORT", "5055").parse().map_err(|_| {
                    ScrapeError::InvalidConfig("SCRAPE_PORT must be a valid port number".into())
                })?,
                host: get_env_or("SCRAPE_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            circuits: CircuitConfig {
                host: get_env_or("CIRCUIT_HOST", "127.0.0.1"),
                ports: parse_circuit_ports(&env::var("CIRCUIT_PORTS").unwrap_or_default())?,
                fetch_timeout: parse_positive("FETCH_TIMEOUT_SECS", "30", MAX_TIMEOUT_SECS)?,
                resolve_timeout: parse_positive("RESOLVE_TIMEOUT_SECS", "15", MAX_TIMEOUT_SECS)?,
                ip_echo_url: parse_ip_echo_url()?,
            },
            rotation: RotationConfig {
                cooldown_hours: parse_positive("COOLDOWN_HOURS", "24", MAX_COOLDOWN_HOURS)?,
                max_admission_attempts: u32::try_from(parse_positive(
                    "MAX_ADMISSION_ATTEMPTS",
                    "5",
                    MAX_ADMISSION_ATTEMPTS,
                )?)
                .map_err(|_| {
                    ScrapeError::InvalidConfig("MAX_ADMISSION_ATTEMPTS is out of range".into())
                })?,
                refresh_interval_minutes: parse_positive(
                    "REFRESH_INTERVAL_MINUTES",
                    "10",
                    MAX_REFRESH_INTERVAL_MINUTES,
                )?,
                eviction_interval_hours: parse_positive(
                    "EVICTION_INTERVAL_HOURS",
                    "24",
                    MAX_EVICTION_INTERVAL_HOURS,
                )?,
            },
            database: DatabaseConfig {
                path: get_env_or("DATABASE_PATH", "./data/data.sqlite"),
                max_connections: get_env_or("DB_MAX_CONNECTIONS", "5").parse().map_err(|_| {
                    ScrapeError::InvalidConfig("DB_MAX_CONNECTIONS must be a valid number".into())
                })?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        };

        Ok(config)
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Parse a comma-separated port list, keeping order and rejecting duplicates
fn parse_circuit_ports(raw: &str) -> Result<Vec<u16>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(DEFAULT_CIRCUIT_PORTS.to_vec());
    }

    let mut seen = HashSet::new();
    let mut ports = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let port: u16 = part.parse().map_err(|_| {
            ScrapeError::InvalidConfig(format!("CIRCUIT_PORTS contains an invalid port: {}", part))
        })?;
        if !seen.insert(port) {
            return Err(ScrapeError::InvalidConfig(format!(
                "CIRCUIT_PORTS lists port {} more than once",
                port
            )));
        }
        ports.push(port);
    }

    if ports.is_empty() {
        return Err(ScrapeError::InvalidConfig(
            "CIRCUIT_PORTS must list at least one port".into(),
        ));
    }

    Ok(ports)
}

fn parse_ip_echo_url() -> Result<String> {
    let raw = get_env_or("IP_ECHO_URL", "https://api64.ipify.org?format=json");
    let url = Url::parse(raw.trim()).map_err(|e| {
        ScrapeError::InvalidConfig(format!("IP_ECHO_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(ScrapeError::InvalidConfig(format!(
            "IP_ECHO_URL has unsupported scheme: {}",
            other
        ))),
    }
}

/// Parse a number in `1..=max`
fn parse_positive(key: &str, default: &str, max: u64) -> Result<u64> {
    match get_env_or(key, default).parse::<u64>() {
        Ok(v) if v > 0 && v <= max => Ok(v),
        Ok(v) if v > max => Err(ScrapeError::InvalidConfig(format!(
            "{} must be at most {}",
            key, max
        ))),
        _ => Err(ScrapeError::InvalidConfig(format!(
            "{} must be a positive number",
            key
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
