// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Two-zone fan controller.
//!
//! Samples temperature sensors, maps the hottest valid reading through a
//! step curve, and keeps each cooling zone at the resulting duty. Anything
//! the controller cannot handle safely forces the fans to full speed and
//! hands control back to the firmware.

pub mod config;
pub mod control;
pub mod curve;
pub mod error;
pub mod events;
pub mod gateway;
pub mod safety;
pub mod zone;

pub use control::{ControlHandle, ControlLoop, ControlMode, ControlSettings, Exit, run_guarded};
pub use curve::{CurveStep, FanCurve};
pub use error::{ConfigError, CurveError, GatewayError, StartupError};
pub use events::{Event, EventSink, LogSink};
pub use gateway::{ActuatorGateway, SensorGateway, SensorReading};
pub use safety::{Fault, SafetyState, SafetySupervisor};
pub use zone::{ZoneId, ZoneTracker};
