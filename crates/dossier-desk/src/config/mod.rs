use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::requests::{PriorityPolicy, Role};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub deadlines: DeadlineConfig,
    pub priority: PriorityPolicy,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let overrides_csv = env::var("APP_DEADLINES_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let defaults = PriorityPolicy::default();
        let priority = PriorityPolicy::new(
            read_number("APP_PRIORITY_URGENCY_WEIGHT", defaults.urgency_weight)?,
            read_number("APP_PRIORITY_HORIZON_DAYS", defaults.horizon_days)?,
            read_number("APP_PRIORITY_OVERDUE_BONUS", defaults.overdue_bonus)?,
            read_number("APP_PRIORITY_BACKLOG_WEIGHT", defaults.backlog_weight)?,
        );

        let static_tokens = match env::var("APP_STATIC_TOKENS") {
            Ok(raw) => parse_static_tokens(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            deadlines: DeadlineConfig { overrides_csv },
            priority,
            auth: AuthConfig { static_tokens },
        })
    }
}

fn read_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber {
                    key,
                    value: raw.clone(),
                })
        }
        _ => Ok(default),
    }
}

/// Parses `token:user_id:role` entries separated by commas.
pub fn parse_static_tokens(raw: &str) -> Result<Vec<StaticToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':').map(str::trim);
            let token = parts.next().filter(|value| !value.is_empty());
            let user_id = parts.next().filter(|value| !value.is_empty());
            let role = parts.next().and_then(Role::parse);

            match (token, user_id, role) {
                (Some(token), Some(user_id), Some(role)) => Ok(StaticToken {
                    token: token.to_string(),
                    user_id: user_id.to_string(),
                    role,
                }),
                _ => Err(ConfigError::InvalidStaticToken {
                    entry: entry.to_string(),
                }),
            }
        })
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where statutory deadline overrides come from.
#[derive(Debug, Clone, Default)]
pub struct DeadlineConfig {
    pub overrides_csv: Option<PathBuf>,
}

/// Bearer tokens accepted by the in-memory identity adapter.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub static_tokens: Vec<StaticToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticToken {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    InvalidStaticToken { entry: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be numeric (found '{value}')")
            }
            ConfigError::InvalidStaticToken { entry } => write!(
                f,
                "APP_STATIC_TOKENS entry '{entry}' must look like token:user_id:citizen|clerk"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidStaticToken { .. } => None,
        }
    }
}
