// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error types.
//!
//! Configuration and startup errors are fatal before the control loop takes
//! ownership of the fans. Gateway errors are reported by the actuator side
//! and always escalate through the safety supervisor.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::zone::ZoneId;

/// A fan curve table that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("curve must have at least one step")]
    Empty,

    #[error("curve thresholds must be strictly increasing ({prev}C followed by {next}C)")]
    Unsorted { prev: i32, next: i32 },

    #[error("duty {duty}% at {temp_c}C is out of range (0-100)")]
    DutyOutOfRange { temp_c: i32, duty: u8 },

    #[error("duty drops from {prev}% to {next}% at {temp_c}C")]
    DecreasingDuty { temp_c: i32, prev: u8, next: u8 },
}

/// Configuration that failed to load or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The controller could not start and never touched the actuators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("invalid control settings: {0}")]
    InvalidSettings(String),

    #[error("no valid reading from any of the primary sensors: {}", sensors.join(", "))]
    NoValidReadings { sensors: Vec<String> },
}

/// A sensor or actuator operation that did not complete.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    Status {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("zone {0} has no hardware mapping")]
    UnknownZone(ZoneId),

    #[error("sensor {0} not found")]
    UnknownSensor(String),
}
