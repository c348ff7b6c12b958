// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Loads sensors, zones, the fan curve and the hardware backend from TOML.
//! Default path: `/etc/zonefan/config.toml`

use crate::control::ControlSettings;
use crate::curve::FanCurve;
use crate::error::ConfigError;
use crate::gateway::hwmon::HwmonConfig;
use crate::gateway::ipmitool::IpmitoolConfig;
use crate::zone::ZoneId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/zonefan/config.toml";

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default duty for the startup sanity write.
pub const DEFAULT_STARTUP_DUTY: u8 = 50;

/// Default number of stable cycles between heartbeats.
pub const DEFAULT_HEARTBEAT_CYCLES: u64 = 60;

/// Default emergency threshold in degrees Celsius.
pub const DEFAULT_EMERGENCY_C: i32 = 95;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Safety limits.
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Primary sensor names; the hottest valid reading drives the curve.
    #[serde(default = "default_sensors")]
    pub sensors: Vec<String>,

    /// Zones driven with the curve's duty.
    #[serde(default = "default_zones")]
    pub zones: Vec<ZoneId>,

    /// Step curve shared by all zones.
    #[serde(default)]
    pub curve: FanCurve,

    /// Hardware backend.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Poll interval for the control loop, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Duty written to every zone right after taking manual control.
    #[serde(default = "default_startup_duty")]
    pub startup_duty: u8,

    /// Stable cycles between heartbeat log lines (0 disables them).
    #[serde(default = "default_heartbeat_cycles")]
    pub heartbeat_cycles: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            startup_duty: DEFAULT_STARTUP_DUTY,
            heartbeat_cycles: DEFAULT_HEARTBEAT_CYCLES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Readings at or above this trip the failsafe.
    #[serde(default = "default_emergency")]
    pub emergency_c: i32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            emergency_c: DEFAULT_EMERGENCY_C,
        }
    }
}

/// Which hardware backend reads sensors and drives zones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum GatewayConfig {
    /// BMC via ipmitool raw commands.
    #[serde(rename = "ipmitool")]
    Ipmitool(IpmitoolConfig),

    /// Linux hwmon sysfs.
    #[serde(rename = "hwmon")]
    Hwmon(HwmonConfig),
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig::Ipmitool(IpmitoolConfig::default())
    }
}

impl GatewayConfig {
    fn maps_zone(&self, zone: &ZoneId) -> bool {
        match self {
            GatewayConfig::Ipmitool(c) => c.zones.contains_key(zone.as_str()),
            GatewayConfig::Hwmon(c) => c.zones.get(zone.as_str()).is_some_and(|p| !p.is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            safety: SafetyConfig::default(),
            sensors: default_sensors(),
            zones: default_zones(),
            curve: FanCurve::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Check cross-field consistency. The curve itself is already valid by
    /// construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.sensors.is_empty() {
            return invalid("at least one primary sensor is required".into());
        }
        if let Some(dup) = first_duplicate(&self.sensors) {
            return invalid(format!("sensor '{dup}' is listed twice"));
        }
        if self.zones.is_empty() {
            return invalid("at least one zone is required".into());
        }
        if let Some(dup) = first_duplicate(&self.zones) {
            return invalid(format!("zone '{dup}' is listed twice"));
        }
        if self.daemon.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be positive".into());
        }
        if !(1..=100).contains(&self.daemon.startup_duty) {
            return invalid(format!(
                "startup_duty {} must be within 1-100",
                self.daemon.startup_duty
            ));
        }
        if self.safety.emergency_c <= self.curve.max_threshold() {
            return invalid(format!(
                "emergency_c {} must be above the highest curve threshold {}",
                self.safety.emergency_c,
                self.curve.max_threshold()
            ));
        }
        if let Some(zone) = self.zones.iter().find(|z| !self.gateway.maps_zone(z)) {
            return invalid(format!("zone '{zone}' has no mapping in the gateway config"));
        }
        if let GatewayConfig::Ipmitool(c) = &self.gateway {
            if c.timeout_ms == 0 {
                return invalid("ipmitool timeout_ms must be positive".into());
            }
            if c.duty_full_scale == 0 {
                return invalid("ipmitool duty_full_scale must be positive".into());
            }
        }
        Ok(())
    }

    /// Validate and produce the settings the control loop runs with.
    pub fn control_settings(&self) -> Result<ControlSettings, ConfigError> {
        self.validate()?;
        Ok(ControlSettings {
            sensors: self.sensors.clone(),
            zones: self.zones.clone(),
            curve: self.curve.clone(),
            poll_interval: Duration::from_millis(self.daemon.poll_interval_ms),
            emergency_c: self.safety.emergency_c,
            startup_duty: self.daemon.startup_duty,
            heartbeat_cycles: self.daemon.heartbeat_cycles,
        })
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse config from TOML text.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Load config from a TOML file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents)?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn first_duplicate<T: Eq + std::hash::Hash>(items: &[T]) -> Option<&T> {
    let mut seen = HashSet::new();
    items.iter().find(|item| !seen.insert(*item))
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_startup_duty() -> u8 {
    DEFAULT_STARTUP_DUTY
}

fn default_heartbeat_cycles() -> u64 {
    DEFAULT_HEARTBEAT_CYCLES
}

fn default_emergency() -> i32 {
    DEFAULT_EMERGENCY_C
}

fn default_sensors() -> Vec<String> {
    vec!["CPU Temp".to_string(), "Peripheral Temp".to_string()]
}

fn default_zones() -> Vec<ZoneId> {
    vec![ZoneId::from("cpu"), ZoneId::from("peripheral")]
}
