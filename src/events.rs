// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Observations emitted by the controller.
//!
//! The control loop reports what it did through an [`EventSink`]; it never
//! formats or persists log lines itself. [`LogSink`] hands every event to the
//! `log` facade, which supplies the timestamp and routing.

use crate::control::{ControlMode, Exit};
use crate::error::StartupError;
use crate::safety::Fault;
use crate::zone::ZoneId;
use log::Level;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Starting {
        sensors: Vec<String>,
        zones: Vec<ZoneId>,
    },
    /// Startup was abandoned before any actuator was touched.
    StartupFailed { error: StartupError },
    /// A primary sensor gave no usable reading this cycle.
    SensorMiss { sensor: String },
    ModeChanged { mode: ControlMode },
    ModeChangeFailed { mode: ControlMode, detail: String },
    DutyChanged {
        zone: ZoneId,
        from: Option<u8>,
        to: u8,
        celsius: i32,
    },
    Stable { celsius: i32, duty: u8 },
    Heartbeat {
        celsius: i32,
        duty: u8,
        stable_cycles: u64,
    },
    SafetyTrip { fault: Fault },
    /// Outcome of one full-speed write during the failsafe sequence.
    ForcedFull {
        zone: ZoneId,
        ok: bool,
        detail: Option<String>,
    },
    ShutdownRequested,
    Stopped { exit: Exit },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::SensorMiss { .. } => Level::Warn,
            Event::StartupFailed { .. }
            | Event::ModeChangeFailed { .. }
            | Event::SafetyTrip { .. }
            | Event::ForcedFull { .. } => Level::Error,
            Event::Stopped { exit } if !exit.is_success() => Level::Error,
            Event::Stable { .. } => Level::Debug,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Starting { sensors, zones } => {
                let zones: Vec<&str> = zones.iter().map(ZoneId::as_str).collect();
                write!(
                    f,
                    "Starting: sensors [{}], zones [{}]",
                    sensors.join(", "),
                    zones.join(", ")
                )
            }
            Event::StartupFailed { error } => {
                write!(f, "Startup failed, fans left under firmware control: {error}")
            }
            Event::SensorMiss { sensor } => write!(f, "No valid reading from sensor '{sensor}'"),
            Event::ModeChanged { mode } => write!(f, "Fan control mode is now {mode}"),
            Event::ModeChangeFailed { mode, detail } => {
                write!(f, "Failed to switch fan control to {mode}: {detail}")
            }
            Event::DutyChanged {
                zone,
                from,
                to,
                celsius,
            } => match from {
                Some(from) => write!(f, "Zone {zone}: {from}% -> {to}% at {celsius}C"),
                None => write!(f, "Zone {zone}: set to {to}% at {celsius}C"),
            },
            Event::Stable { celsius, duty } => write!(f, "Stable: {celsius}C, {duty}%"),
            Event::Heartbeat {
                celsius,
                duty,
                stable_cycles,
            } => write!(
                f,
                "Holding {duty}% at {celsius}C ({stable_cycles} stable cycles)"
            ),
            Event::SafetyTrip { fault } => write!(f, "SAFETY TRIP: {fault}"),
            Event::ForcedFull { zone, ok: true, .. } => write!(f, "Zone {zone} forced to 100%"),
            Event::ForcedFull { zone, detail, .. } => write!(
                f,
                "Failed to force zone {zone} to 100%: {}",
                detail.as_deref().unwrap_or("unknown error")
            ),
            Event::ShutdownRequested => write!(f, "Shutdown requested"),
            Event::Stopped { exit } => write!(f, "Stopped: {exit}"),
        }
    }
}

/// Receives controller events. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &Event);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &Event) {
        log::log!(target: "zonefan", event.level(), "{event}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(
            Event::SensorMiss {
                sensor: "CPU Temp".into()
            }
            .level(),
            Level::Warn
        );
        assert_eq!(Event::Stable { celsius: 40, duty: 15 }.level(), Level::Debug);
        assert_eq!(
            Event::SafetyTrip {
                fault: Fault::SensorFailure {
                    sensors: vec!["CPU Temp".into()]
                }
            }
            .level(),
            Level::Error
        );
        assert_eq!(Event::Stopped { exit: Exit::Shutdown }.level(), Level::Info);
        assert_eq!(
            Event::StartupFailed {
                error: StartupError::NoValidReadings { sensors: vec![] }
            }
            .level(),
            Level::Error
        );
        assert_eq!(
            Event::Stopped {
                exit: Exit::Failsafe(Fault::SensorFailure { sensors: vec![] })
            }
            .level(),
            Level::Error
        );
    }

    #[test]
    fn test_duty_change_display() {
        let first = Event::DutyChanged {
            zone: ZoneId::from("cpu"),
            from: None,
            to: 15,
            celsius: 50,
        };
        assert_eq!(first.to_string(), "Zone cpu: set to 15% at 50C");

        let change = Event::DutyChanged {
            zone: ZoneId::from("cpu"),
            from: Some(15),
            to: 60,
            celsius: 72,
        };
        assert_eq!(change.to_string(), "Zone cpu: 15% -> 60% at 72C");
    }
}
