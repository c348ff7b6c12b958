// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Hardware access behind two narrow traits.
//!
//! The controller only ever talks to a [`SensorGateway`] and an
//! [`ActuatorGateway`]. Backends:
//!
//! - [`ipmitool`]: BMC fan zones driven through `ipmitool raw` commands
//! - [`hwmon`]: Linux hwmon sysfs PWM outputs grouped into zones

pub mod hwmon;
pub mod ipmitool;

use crate::error::GatewayError;
use crate::zone::ZoneId;
use serde::Serialize;
use std::future::Future;

/// One sensor sample. `celsius` is `None` when the value could not be
/// obtained or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub name: String,
    pub celsius: Option<i32>,
}

impl SensorReading {
    pub fn valid(name: impl Into<String>, celsius: i32) -> Self {
        Self {
            name: name.into(),
            celsius: Some(celsius),
        }
    }

    pub fn invalid(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            celsius: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.celsius.is_some()
    }
}

/// Read side: named temperature sensors.
pub trait SensorGateway {
    /// Read one sensor. Implementations must not fail or block
    /// indefinitely; any problem yields an invalid reading.
    fn read_sensor(&mut self, name: &str) -> impl Future<Output = SensorReading> + Send;
}

/// Write side: fan control mode and per-zone duty.
pub trait ActuatorGateway {
    /// Take fan control away from the firmware.
    fn enable_manual_mode(&mut self) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Hand fan control back to the firmware.
    fn enable_auto_mode(&mut self) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Command `percent` (0-100) on every fan in `zone`. Scaling to device
    /// units is the implementation's job.
    fn set_zone_duty(
        &mut self,
        zone: &ZoneId,
        percent: u8,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Scale a 0-100 percentage onto `0..=full_scale`, rounding to nearest.
pub fn scale_percent(percent: u8, full_scale: u8) -> u8 {
    let percent = u32::from(percent.min(100));
    ((percent * u32::from(full_scale) + 50) / 100) as u8
}
