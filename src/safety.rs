// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Safety supervisor.
//!
//! Consulted every cycle. Any condition the controller cannot reason about
//! confidently (a reading at or above the emergency threshold, no valid
//! readings at all, an actuator that refused a command) produces a
//! [`Fault`]. Faults are terminal: [`SafetySupervisor::engage`] runs the one
//! failsafe sequence that ends the controller abnormally.
//!
//! ## Failsafe sequence
//!
//! 1. Report the trip.
//! 2. Drive every zone to 100%, continuing past individual failures.
//! 3. Hand fan control back to the firmware.
//!
//! Each step is best-effort and its outcome is reported; none of them can
//! prevent the controller from stopping.

use crate::control::ControlMode;
use crate::events::{Event, EventSink};
use crate::gateway::ActuatorGateway;
use crate::zone::ZoneId;
use std::fmt;

/// Duty forced on every zone when the failsafe engages.
pub const FULL_DUTY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyState {
    Nominal,
    EmergencyTemperature,
    SensorFailure,
    ActuatorFailure,
}

/// The actuator command that was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorAction {
    EnableManual,
    SetDuty { zone: ZoneId, duty: u8 },
}

impl fmt::Display for ActuatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorAction::EnableManual => write!(f, "enable manual mode"),
            ActuatorAction::SetDuty { zone, duty } => write!(f, "set zone {zone} to {duty}%"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    EmergencyTemperature { celsius: i32, threshold: i32 },
    SensorFailure { sensors: Vec<String> },
    ActuatorFailure {
        action: ActuatorAction,
        detail: String,
    },
}

impl Fault {
    pub fn state(&self) -> SafetyState {
        match self {
            Fault::EmergencyTemperature { .. } => SafetyState::EmergencyTemperature,
            Fault::SensorFailure { .. } => SafetyState::SensorFailure,
            Fault::ActuatorFailure { .. } => SafetyState::ActuatorFailure,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::EmergencyTemperature { celsius, threshold } => write!(
                f,
                "emergency temperature {celsius}C (threshold {threshold}C)"
            ),
            Fault::SensorFailure { sensors } => write!(
                f,
                "no valid reading from any primary sensor ({})",
                sensors.join(", ")
            ),
            Fault::ActuatorFailure { action, detail } => {
                write!(f, "actuator failed to {action}: {detail}")
            }
        }
    }
}

/// Evaluates the danger signal and actuator results, and runs the failsafe.
#[derive(Debug)]
pub struct SafetySupervisor {
    emergency_c: i32,
    sensors: Vec<String>,
    state: SafetyState,
}

impl SafetySupervisor {
    pub fn new(emergency_c: i32, sensors: Vec<String>) -> Self {
        Self {
            emergency_c,
            sensors,
            state: SafetyState::Nominal,
        }
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    /// Check this cycle's danger signal. Returns the usable temperature, or
    /// the fault it trips.
    pub fn assess(&mut self, danger: Option<i32>) -> Result<i32, Fault> {
        match danger {
            None => Err(self.trip(Fault::SensorFailure {
                sensors: self.sensors.clone(),
            })),
            Some(celsius) if celsius >= self.emergency_c => {
                Err(self.trip(Fault::EmergencyTemperature {
                    celsius,
                    threshold: self.emergency_c,
                }))
            }
            Some(celsius) => Ok(celsius),
        }
    }

    /// Record a refused actuator command.
    pub fn actuator_failed(&mut self, action: ActuatorAction, detail: impl fmt::Display) -> Fault {
        self.trip(Fault::ActuatorFailure {
            action,
            detail: detail.to_string(),
        })
    }

    fn trip(&mut self, fault: Fault) -> Fault {
        self.state = fault.state();
        fault
    }

    /// Run the failsafe sequence for `fault`. Returns whether the firmware
    /// accepted control back.
    pub async fn engage<A, E>(
        &mut self,
        fault: &Fault,
        zones: &[ZoneId],
        actuator: &mut A,
        sink: &mut E,
    ) -> bool
    where
        A: ActuatorGateway,
        E: EventSink,
    {
        self.state = fault.state();
        sink.emit(&Event::SafetyTrip {
            fault: fault.clone(),
        });

        for zone in zones {
            let event = match actuator.set_zone_duty(zone, FULL_DUTY).await {
                Ok(()) => Event::ForcedFull {
                    zone: zone.clone(),
                    ok: true,
                    detail: None,
                },
                Err(e) => Event::ForcedFull {
                    zone: zone.clone(),
                    ok: false,
                    detail: Some(e.to_string()),
                },
            };
            sink.emit(&event);
        }

        restore_auto(actuator, sink).await
    }
}

/// Best-effort hand-back to firmware control. Returns whether it succeeded.
pub(crate) async fn restore_auto<A, E>(actuator: &mut A, sink: &mut E) -> bool
where
    A: ActuatorGateway,
    E: EventSink,
{
    match actuator.enable_auto_mode().await {
        Ok(()) => {
            sink.emit(&Event::ModeChanged {
                mode: ControlMode::Auto,
            });
            true
        }
        Err(e) => {
            sink.emit(&Event::ModeChangeFailed {
                mode: ControlMode::Auto,
                detail: e.to_string(),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> SafetySupervisor {
        SafetySupervisor::new(95, vec!["CPU Temp".into(), "Peripheral Temp".into()])
    }

    #[test]
    fn test_nominal_reading_passes() {
        let mut s = supervisor();
        assert_eq!(s.assess(Some(50)), Ok(50));
        assert_eq!(s.assess(Some(94)), Ok(94));
        assert_eq!(s.state(), SafetyState::Nominal);
    }

    #[test]
    fn test_emergency_at_threshold() {
        let mut s = supervisor();
        let fault = s.assess(Some(95)).unwrap_err();
        assert_eq!(
            fault,
            Fault::EmergencyTemperature {
                celsius: 95,
                threshold: 95
            }
        );
        assert_eq!(s.state(), SafetyState::EmergencyTemperature);
    }

    #[test]
    fn test_undefined_signal_is_sensor_failure() {
        let mut s = supervisor();
        let fault = s.assess(None).unwrap_err();
        assert_eq!(fault.state(), SafetyState::SensorFailure);
        assert_eq!(s.state(), SafetyState::SensorFailure);
        assert!(fault.to_string().contains("CPU Temp, Peripheral Temp"));
    }

    #[test]
    fn test_actuator_failure() {
        let mut s = supervisor();
        let fault = s.actuator_failed(
            ActuatorAction::SetDuty {
                zone: ZoneId::from("cpu"),
                duty: 60,
            },
            "timed out",
        );
        assert_eq!(s.state(), SafetyState::ActuatorFailure);
        assert_eq!(
            fault.to_string(),
            "actuator failed to set zone cpu to 60%: timed out"
        );
    }
}
