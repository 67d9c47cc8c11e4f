// Configuration File Support
//
// TOML configuration for the QueryDeck server with environment variable overrides.
// Configuration files are loaded from the XDG config directory: ~/.config/querydeck/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Per-client rate limiting
    pub rate_limit: RateLimitConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API listens on
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose /metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from a specific path, usually [`config_path`](Self::config_path).
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the resulting configuration fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?
        } else {
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/querydeck/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "querydeck", "QueryDeck") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("querydeck")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - QUERYDECK_LOG_LEVEL
    /// - QUERYDECK_LOG_FORMAT
    /// - QUERYDECK_BIND_ADDR
    /// - QUERYDECK_METRICS_ENABLED
    /// - QUERYDECK_RATE_LIMIT_{ENABLED,RPM,BURST,CLEANUP_SECS}
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("QUERYDECK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("QUERYDECK_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(addr) = std::env::var("QUERYDECK_BIND_ADDR") {
            if addr.parse::<SocketAddr>().is_ok() {
                self.server.bind_addr = addr;
            }
        }

        if let Ok(enabled) = std::env::var("QUERYDECK_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self.rate_limit = self.rate_limit.apply_env_overrides();
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.bind_addr()?;

        let rate_limit = &self.rate_limit;
        if rate_limit.enabled {
            if rate_limit.burst_size == 0 {
                anyhow::bail!("Rate limit burst size must be > 0");
            }
            if rate_limit.cleanup_interval_secs == 0 {
                anyhow::bail!("Rate limit cleanup interval must be > 0");
            }
            if rate_limit.idle_timeout_secs == 0 {
                anyhow::bail!("Rate limit idle timeout must be > 0");
            }
            if rate_limit.auth.min_burst == 0 {
                anyhow::bail!("Auth rate limit minimum burst must be > 0");
            }
        }

        Ok(())
    }

    /// Settings that are valid but probably not what was meant
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        let rate_limit = &self.rate_limit;
        if rate_limit.enabled && rate_limit.idle_timeout_secs < rate_limit.cleanup_interval_secs {
            warnings.push(
                "Idle timeout is shorter than the cleanup interval; buckets will linger up to one interval",
            );
        }
        warnings
    }

    /// Report where the configuration came from and any warnings.
    ///
    /// Loading happens before the subscriber exists, so the binary calls this
    /// once logging is set up.
    pub fn log_loaded(&self, path: &Path) {
        if path.exists() {
            tracing::info!("Loaded configuration from {:?}", path);
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }

        for warning in self.warnings() {
            tracing::warn!(
                idle_timeout_secs = self.rate_limit.idle_timeout_secs,
                cleanup_interval_secs = self.rate_limit.cleanup_interval_secs,
                "{}",
                warning
            );
        }
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind_addr))
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
