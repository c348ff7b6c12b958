// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! BMC fan control through `ipmitool`.
//!
//! Every operation runs one `ipmitool` process with a bounded timeout. The
//! raw commands are the Supermicro OEM fan interface:
//!
//! | operation      | command                                   |
//! |----------------|-------------------------------------------|
//! | fan mode       | `raw 0x30 0x45 0x01 <mode>`               |
//! | zone duty      | `raw 0x30 0x70 0x66 0x01 <zone> <duty>`   |
//! | read sensor    | `sensor reading <name>`                   |
//!
//! Manual control uses the BMC's "full" mode, in which the firmware stops
//! adjusting duty on its own.

use super::{ActuatorGateway, SensorGateway, SensorReading, scale_percent};
use crate::error::GatewayError;
use crate::zone::ZoneId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{self, Duration};

pub const DEFAULT_PROGRAM: &str = "ipmitool";

/// Default per-command timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// BMC fan modes selectable with `raw 0x30 0x45 0x01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BmcFanMode {
    Standard,
    Full,
    Optimal,
    HeavyIo,
}

impl BmcFanMode {
    pub fn code(self) -> u8 {
        match self {
            BmcFanMode::Standard => 0x00,
            BmcFanMode::Full => 0x01,
            BmcFanMode::Optimal => 0x02,
            BmcFanMode::HeavyIo => 0x04,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpmitoolConfig {
    /// Path or name of the ipmitool binary.
    #[serde(default = "default_program")]
    pub program: String,

    /// Per-command timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Remote interface (e.g. "lanplus"); local in-band access when unset.
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// File holding the BMC password, passed with `-f`.
    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// Firmware mode restored when handing control back.
    #[serde(default = "default_auto_mode")]
    pub auto_mode: BmcFanMode,

    /// Raw value meaning 100% duty. Boards differ: 255 or 100.
    #[serde(default = "default_full_scale")]
    pub duty_full_scale: u8,

    /// Zone name -> BMC zone number.
    #[serde(default = "default_zones")]
    pub zones: BTreeMap<String, u8>,
}

impl Default for IpmitoolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interface: None,
            host: None,
            username: None,
            password_file: None,
            auto_mode: default_auto_mode(),
            duty_full_scale: default_full_scale(),
            zones: default_zones(),
        }
    }
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_auto_mode() -> BmcFanMode {
    BmcFanMode::Optimal
}

fn default_full_scale() -> u8 {
    u8::MAX
}

fn default_zones() -> BTreeMap<String, u8> {
    BTreeMap::from([("cpu".to_string(), 0x00), ("peripheral".to_string(), 0x01)])
}

// ---------------------------------------------------------------------------
// Command construction and parsing
// ---------------------------------------------------------------------------

fn hex(b: u8) -> String {
    format!("0x{b:02x}")
}

/// Arguments for switching the BMC fan mode.
pub fn fan_mode_args(mode: BmcFanMode) -> Vec<String> {
    ["raw", "0x30", "0x45", "0x01"]
        .into_iter()
        .map(String::from)
        .chain([hex(mode.code())])
        .collect()
}

/// Arguments for setting one zone's raw duty.
pub fn zone_duty_args(zone: u8, raw_duty: u8) -> Vec<String> {
    ["raw", "0x30", "0x70", "0x66", "0x01"]
        .into_iter()
        .map(String::from)
        .chain([hex(zone), hex(raw_duty)])
        .collect()
}

pub fn sensor_reading_args(name: &str) -> Vec<String> {
    vec!["sensor".into(), "reading".into(), name.into()]
}

/// Parse `ipmitool sensor reading` output such as `CPU Temp | 45`.
///
/// Takes the value after the last `|` and rounds it to whole degrees.
/// Returns `None` for `na`, empty, or unparsable values.
pub fn parse_sensor_reading(stdout: &str) -> Option<i32> {
    let line = stdout.lines().find(|l| l.contains('|'))?;
    let value = line.rsplit('|').next()?.trim();
    let celsius: f64 = value.parse().ok()?;
    celsius.is_finite().then(|| celsius.round() as i32)
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IpmitoolGateway {
    config: IpmitoolConfig,
    timeout: Duration,
}

impl IpmitoolGateway {
    pub fn new(config: IpmitoolConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        Self { config, timeout }
    }

    /// Connection options placed before every subcommand.
    fn connection_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let options = [
            ("-I", self.config.interface.clone()),
            ("-H", self.config.host.clone()),
            ("-U", self.config.username.clone()),
            (
                "-f",
                self.config
                    .password_file
                    .as_ref()
                    .map(|p| p.display().to_string()),
            ),
        ];
        for (flag, value) in options {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value);
            }
        }
        args
    }

    /// Run ipmitool with `args` and return its stdout.
    async fn invoke(&self, args: &[String]) -> Result<String, GatewayError> {
        let command = format!("{} {}", self.config.program, args.join(" "));
        log::debug!("Running {command}");

        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.connection_args())
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| GatewayError::Spawn {
                program: self.config.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(GatewayError::Timeout {
                    command,
                    after: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(GatewayError::Status {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn zone_number(&self, zone: &ZoneId) -> Result<u8, GatewayError> {
        self.config
            .zones
            .get(zone.as_str())
            .copied()
            .ok_or_else(|| GatewayError::UnknownZone(zone.clone()))
    }
}

impl SensorGateway for IpmitoolGateway {
    async fn read_sensor(&mut self, name: &str) -> SensorReading {
        match self.invoke(&sensor_reading_args(name)).await {
            Ok(stdout) => match parse_sensor_reading(&stdout) {
                Some(c) => SensorReading::valid(name, c),
                None => {
                    log::debug!("Unparsable reading for '{name}': {}", stdout.trim());
                    SensorReading::invalid(name)
                }
            },
            Err(e) => {
                log::debug!("Reading '{name}' failed: {e}");
                SensorReading::invalid(name)
            }
        }
    }
}

impl ActuatorGateway for IpmitoolGateway {
    async fn enable_manual_mode(&mut self) -> Result<(), GatewayError> {
        self.invoke(&fan_mode_args(BmcFanMode::Full)).await.map(drop)
    }

    async fn enable_auto_mode(&mut self) -> Result<(), GatewayError> {
        self.invoke(&fan_mode_args(self.config.auto_mode))
            .await
            .map(drop)
    }

    async fn set_zone_duty(&mut self, zone: &ZoneId, percent: u8) -> Result<(), GatewayError> {
        let number = self.zone_number(zone)?;
        let raw = scale_percent(percent, self.config.duty_full_scale);
        self.invoke(&zone_duty_args(number, raw)).await.map(drop)
    }
}
