//! Configuration management for the Field Lifecycle Management Service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with FLM_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::LifecycleConfig;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Satellite vegetation-analysis API configuration
    pub satellite: SatelliteConfig,

    /// Detection cycle and scheduler configuration
    pub monitoring: MonitoringConfig,

    /// Lifecycle thresholds and windows
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SatelliteConfig {
    /// Vegetation-analysis API endpoint
    pub api_endpoint: String,

    /// Vegetation-analysis API key; empty disables external fetches
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Run the detection cycle on an in-process timer
    pub scheduler_enabled: bool,

    /// Minutes between scheduled detection cycles
    pub poll_interval_minutes: u64,

    /// Fields processed concurrently within one cycle
    pub max_concurrent_fields: usize,

    /// Per-field processing timeout in seconds
    pub field_timeout_secs: u64,

    /// Analysis cache TTL in hours
    pub cache_ttl_hours: i64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("FLM_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("satellite.api_endpoint", "https://api.agromonitor.example/v1")?
            .set_default("satellite.api_key", "")?
            .set_default("monitoring.scheduler_enabled", true)?
            .set_default("monitoring.poll_interval_minutes", 1440)?
            .set_default("monitoring.max_concurrent_fields", 8)?
            .set_default("monitoring.field_timeout_secs", 30)?
            .set_default("monitoring.cache_ttl_hours", 24)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (FLM_ prefix)
            .add_source(
                Environment::with_prefix("FLM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
