//! Configuration loader for the `sensorflow-risk` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The risk thresholds live here too: they are read
//! once at startup into an immutable [`ThresholdConfig`] that is handed to the
//! evaluation components, so nothing downstream touches `env::var`.
use std::env;

use anyhow::{anyhow, bail, Result};
use serde::Serialize;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional float environment variable with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Warning and critical limits for one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl TierThresholds {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }
}

/// Numeric limits used by the risk engine.
///
/// The tier thresholds drive risk classification and alert generation. The
/// `*_max` "elevated" limits are a separate set: they label influential
/// factors and gate the auto-resolve sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdConfig {
    // ---
    pub temperature: TierThresholds,
    pub humidity: TierThresholds,
    /// Compared against the absolute value of the current.
    pub current: TierThresholds,

    pub temperature_max: f64,
    pub humidity_max: f64,
    pub current_max: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temperature: TierThresholds::new(35.0, 45.0),
            humidity: TierThresholds::new(70.0, 85.0),
            current: TierThresholds::new(5.0, 10.0),
            temperature_max: 35.0,
            humidity_max: 80.0,
            current_max: 15.0,
        }
    }
}

impl ThresholdConfig {
    /// Load thresholds from the environment, falling back to the defaults.
    ///
    /// Optional: `TEMP_WARNING`, `TEMP_CRITICAL`, `HUMIDITY_WARNING`,
    /// `HUMIDITY_CRITICAL`, `CURRENT_WARNING`, `CURRENT_CRITICAL`, `TEMP_MAX`,
    /// `HUMIDITY_MAX`, `CURRENT_MAX`.
    pub fn load_from_env() -> Result<Self> {
        // ---
        let d = Self::default();
        let cfg = Self {
            temperature: TierThresholds::new(
                parse_env_f64!("TEMP_WARNING", d.temperature.warning),
                parse_env_f64!("TEMP_CRITICAL", d.temperature.critical),
            ),
            humidity: TierThresholds::new(
                parse_env_f64!("HUMIDITY_WARNING", d.humidity.warning),
                parse_env_f64!("HUMIDITY_CRITICAL", d.humidity.critical),
            ),
            current: TierThresholds::new(
                parse_env_f64!("CURRENT_WARNING", d.current.warning),
                parse_env_f64!("CURRENT_CRITICAL", d.current.critical),
            ),
            temperature_max: parse_env_f64!("TEMP_MAX", d.temperature_max),
            humidity_max: parse_env_f64!("HUMIDITY_MAX", d.humidity_max),
            current_max: parse_env_f64!("CURRENT_MAX", d.current_max),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject non-finite or non-positive limits and inverted tiers.
    pub fn validate(&self) -> Result<()> {
        // ---
        let tiers = [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("current", self.current),
        ];
        for (name, tier) in tiers {
            check_limit(name, "warning", tier.warning)?;
            check_limit(name, "critical", tier.critical)?;
            if tier.warning >= tier.critical {
                bail!(
                    "{} warning threshold ({}) must be below its critical threshold ({})",
                    name,
                    tier.warning,
                    tier.critical
                );
            }
        }
        check_limit("temperature", "max", self.temperature_max)?;
        check_limit("humidity", "max", self.humidity_max)?;
        check_limit("current", "max", self.current_max)?;
        Ok(())
    }
}

fn check_limit(channel: &str, kind: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{} {} threshold must be a positive number, got {}", channel, kind, value);
    }
    Ok(())
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// HTTP listen port.
    pub port: u16,

    /// Upper bound for a single storage call, in milliseconds.
    pub storage_timeout_ms: u64,

    /// Device id used when an ingest payload carries none.
    pub default_device_id: String,

    /// Risk engine limits.
    pub thresholds: ThresholdConfig,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `PORT` – HTTP listen port (default: 5000)
/// - `STORAGE_TIMEOUT_MS` – storage call timeout (default: 5000)
/// - `DEFAULT_DEVICE_ID` – fallback device id (default: `ESP32_001`)
/// - threshold overrides, see [`ThresholdConfig::load_from_env`]
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let port = u16::try_from(parse_env_u32!("PORT", 5000))
        .map_err(|e| anyhow!("Invalid PORT: {}", e))?;
    let storage_timeout_ms = u64::from(parse_env_u32!("STORAGE_TIMEOUT_MS", 5000));
    let default_device_id =
        env::var("DEFAULT_DEVICE_ID").unwrap_or_else(|_| crate::DEFAULT_DEVICE_ID.to_string());
    let thresholds = ThresholdConfig::load_from_env()?;

    Ok(Config {
        db_url,
        db_pool_max,
        port,
        storage_timeout_ms,
        default_device_id,
        thresholds,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let t = &self.thresholds;

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL       : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX        : {}", self.db_pool_max);
        tracing::info!("  PORT               : {}", self.port);
        tracing::info!("  STORAGE_TIMEOUT_MS : {}", self.storage_timeout_ms);
        tracing::info!("  DEFAULT_DEVICE_ID  : {}", self.default_device_id);
        tracing::info!(
            "  THRESHOLDS         : temp {}/{} hum {}/{} current {}/{}",
            t.temperature.warning,
            t.temperature.critical,
            t.humidity.warning,
            t.humidity.critical,
            t.current.warning,
            t.current.critical
        );
        tracing::info!(
            "  ELEVATED LIMITS    : temp {} hum {} current {}",
            t.temperature_max,
            t.humidity_max,
            t.current_max
        );
    }
}

/// Replace the password portion of a connection URL with `****`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // `postgres://user@host` has its only colon in the scheme
            let scheme_only = db_url[colon_pos..].starts_with("://");
            if !scheme_only {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}
