use crate::telemetry::{LogConfig, LogFormat};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    /// When set, both the task store and the job queue live in Redis.
    pub redis_url: Option<String>,
    pub db_path: PathBuf,
    pub queue_key: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub ollama_url: String,
    pub ollama_model: String,
    pub github_api_url: String,
    pub github_host: String,
    pub github_token: Option<String>,
    pub log: LogConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let text = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let bind = match var("LENS_BIND") {
            Some(raw) => raw
                .parse::<IpAddr>()
                .map_err(|err| invalid("LENS_BIND", err.to_string()))?,
            None => IpAddr::from([127, 0, 0, 1]),
        };
        let port = parse_number(var("LENS_PORT"), "LENS_PORT", 8000u16)?;
        let workers = parse_number(var("LENS_WORKERS"), "LENS_WORKERS", 4usize)?;
        let queue_capacity =
            parse_number(var("LENS_QUEUE_CAPACITY"), "LENS_QUEUE_CAPACITY", 256usize)?;

        let filter = var("LENS_LOG")
            .or_else(|| var("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(&filter).map_err(|err| invalid("LENS_LOG", err.to_string()))?;
        let format = match text("LENS_LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => return Err(invalid("LENS_LOG_FORMAT", format!("unknown format {other}"))),
        };

        let config = Self {
            bind,
            port,
            redis_url: var("REDIS_URL"),
            db_path: PathBuf::from(text("LENS_DB_PATH", ".lens/tasks.db")),
            queue_key: text("LENS_QUEUE_KEY", "lens:jobs"),
            workers,
            queue_capacity,
            ollama_url: text("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: text("OLLAMA_MODEL", "llama3.2"),
            github_api_url: text("GITHUB_API_URL", "https://api.github.com"),
            github_host: text("GITHUB_HOST", "github.com"),
            github_token: var("GITHUB_TOKEN"),
            log: LogConfig { filter, format },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(invalid("LENS_QUEUE_CAPACITY", "must be at least 1"));
        }
        if self.redis_url.is_none() && self.workers == 0 {
            return Err(invalid(
                "LENS_WORKERS",
                "the in-process queue needs at least one worker",
            ));
        }
        if self.github_host.contains('/') {
            return Err(invalid("GITHUB_HOST", "expected a bare host name"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse_number<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| invalid(name, format!("{raw:?}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:8000".parse().unwrap());
        assert_eq!(config.redis_url, None);
        assert_eq!(config.db_path, PathBuf::from(".lens/tasks.db"));
        assert_eq!(config.queue_key, "lens:jobs");
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.ollama_model, "llama3.2");
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.github_host, "github.com");
        assert_eq!(config.github_token, None);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("LENS_BIND", "0.0.0.0"),
            ("LENS_PORT", "9100"),
            ("REDIS_URL", "redis://cache:6379/0"),
            ("LENS_WORKERS", "0"),
            ("GITHUB_TOKEN", "ghp_default"),
            ("RUST_LOG", "debug"),
            ("LENS_LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.addr(), "0.0.0.0:9100".parse().unwrap());
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379/0"));
        assert_eq!(config.workers, 0);
        assert_eq!(config.github_token.as_deref(), Some("ghp_default"));
        assert_eq!(config.log.filter, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn lens_log_wins_over_rust_log() {
        let config = config(&[("RUST_LOG", "debug"), ("LENS_LOG", "warn")]).unwrap();
        assert_eq!(config.log.filter, "warn");
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = config(&[("LENS_PORT", ""), ("GITHUB_TOKEN", "  ")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.github_token, None);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config(&[("LENS_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "LENS_PORT", .. }));
        let err = config(&[("LENS_WORKERS", "-1")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "LENS_WORKERS", .. }));
    }

    #[test]
    fn in_process_queue_needs_workers() {
        let err = config(&[("LENS_WORKERS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "LENS_WORKERS", .. }));
        let err = config(&[("LENS_QUEUE_CAPACITY", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "LENS_QUEUE_CAPACITY",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let err = config(&[("LENS_LOG_FORMAT", "xml")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "LENS_LOG_FORMAT",
                ..
            }
        ));
    }
}
