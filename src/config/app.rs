//! Main application configuration
//!
//! This module defines the primary configuration structures for the pickup
//! service, including environment variable and TOML file loading and
//! validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub pickup: PickupSettings,
    pub rcon: RconSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Queue and session behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupSettings {
    /// Team size used when `create` does not name one
    pub default_team_size: usize,
    /// Upper bound for team sizes
    pub max_team_size: usize,
    /// Start the session as soon as an `add` fills the queue
    pub auto_start_when_full: bool,
    /// Delays after start at which the rosters are announced in-game
    pub announcement_delays_seconds: Vec<u64>,
    /// Role whose members receive `promote` announcements
    pub promotion_role: String,
    /// Category voice channels are created under
    pub voice_category: String,
}

/// Game-server control client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RconSettings {
    /// Time allowed for one request/response round trip
    pub timeout_ms: u64,
    /// Receive buffer for a single reply datagram
    pub buffer_size: usize,
    /// Text substituted for the password in replies
    pub redaction_marker: String,
    /// Passwords keyed by "host:port"
    pub passwords: HashMap<String, String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "pickup-room".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for PickupSettings {
    fn default() -> Self {
        Self {
            default_team_size: 4,
            max_team_size: 16,
            auto_start_when_full: false,
            announcement_delays_seconds: vec![120, 240], // 2 and 4 minutes
            promotion_role: "pickup-promote".to_string(),
            voice_category: "Pickup".to_string(),
        }
    }
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            buffer_size: 65000,
            redaction_marker: "[REDACTED]".to_string(),
            passwords: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Pickup settings
        if let Ok(size) = env::var("DEFAULT_TEAM_SIZE") {
            self.pickup.default_team_size = size
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_TEAM_SIZE value: {}", size))?;
        }
        if let Ok(size) = env::var("MAX_TEAM_SIZE") {
            self.pickup.max_team_size = size
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_TEAM_SIZE value: {}", size))?;
        }
        if let Ok(auto_start) = env::var("AUTO_START_WHEN_FULL") {
            self.pickup.auto_start_when_full = auto_start
                .parse()
                .map_err(|_| anyhow!("Invalid AUTO_START_WHEN_FULL value: {}", auto_start))?;
        }
        if let Ok(delays) = env::var("ANNOUNCEMENT_DELAYS_SECONDS") {
            self.pickup.announcement_delays_seconds = delays
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| {
                    d.parse()
                        .map_err(|_| anyhow!("Invalid ANNOUNCEMENT_DELAYS_SECONDS value: {}", d))
                })
                .collect::<Result<Vec<u64>>>()?;
        }
        if let Ok(role) = env::var("PROMOTION_ROLE") {
            self.pickup.promotion_role = role;
        }

        // RCON settings
        if let Ok(timeout) = env::var("RCON_TIMEOUT_MS") {
            self.rcon.timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid RCON_TIMEOUT_MS value: {}", timeout))?;
        }
        if let Ok(size) = env::var("RCON_BUFFER_SIZE") {
            self.rcon.buffer_size = size
                .parse()
                .map_err(|_| anyhow!("Invalid RCON_BUFFER_SIZE value: {}", size))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the RCON round-trip timeout as Duration
    pub fn rcon_timeout(&self) -> Duration {
        Duration::from_millis(self.rcon.timeout_ms)
    }

    /// Get the announcement delays as Durations
    pub fn announcement_delays(&self) -> Vec<Duration> {
        self.pickup
            .announcement_delays_seconds
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate pickup settings
    if config.pickup.max_team_size == 0 || config.pickup.max_team_size > 16 {
        return Err(anyhow!("Max team size must be between 1 and 16"));
    }
    if config.pickup.default_team_size == 0
        || config.pickup.default_team_size > config.pickup.max_team_size
    {
        return Err(anyhow!(
            "Default team size must be between 1 and {}",
            config.pickup.max_team_size
        ));
    }
    if config.pickup.promotion_role.is_empty() {
        return Err(anyhow!("Promotion role cannot be empty"));
    }

    // Validate RCON settings
    if config.rcon.timeout_ms == 0 {
        return Err(anyhow!("RCON timeout must be greater than 0"));
    }
    if config.rcon.buffer_size < 1024 {
        return Err(anyhow!("RCON buffer size must be at least 1024 bytes"));
    }

    Ok(())
}
