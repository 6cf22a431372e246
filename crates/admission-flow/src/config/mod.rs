use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::application::ExtractionConfig;

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
    pub extraction: ExtractionSettings,
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

        let extraction = ExtractionSettings::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            extraction,
        })
    }
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Dials for the document-extraction polling cycle.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub max_attempts: u32,
    pub poll_delay_secs: u64,
    pub max_upload_bytes: usize,
}

impl ExtractionSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let max_attempts = parse_env("APP_EXTRACTION_MAX_ATTEMPTS", 15)?;
        let poll_delay_secs = parse_env("APP_EXTRACTION_POLL_SECONDS", 4)?;
        let max_upload_bytes = parse_env("APP_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?;

        if max_attempts == 0 {
            return Err(ConfigError::InvalidExtraction {
                key: "APP_EXTRACTION_MAX_ATTEMPTS",
            });
        }

        Ok(Self {
            max_attempts,
            poll_delay_secs,
            max_upload_bytes,
        })
    }

    pub fn to_extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            max_attempts: self.max_attempts,
            poll_delay: Duration::from_secs(self.poll_delay_secs),
            max_file_bytes: self.max_upload_bytes,
            ..ExtractionConfig::default()
        }
    }
}

fn parse_env<V>(key: &'static str, default: V) -> Result<V, ConfigError>
where
    V: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<V>()
            .map_err(|_| ConfigError::InvalidExtraction { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidExtraction { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidExtraction { key } => {
                write!(f, "{key} must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidExtraction { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
