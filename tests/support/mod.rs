//! Mock gateways for integration tests.
//!
//! Records every actuator call and every emitted event so tests can assert
//! on the full command history without touching a BMC.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zonefan::{
    ActuatorGateway, ControlHandle, ControlSettings, Event, EventSink, FanCurve, GatewayError,
    SensorGateway, SensorReading, ZoneId,
};

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorCall {
    EnableManual,
    EnableAuto,
    SetDuty { zone: String, duty: u8 },
}

pub fn set(zone: &str, duty: u8) -> ActuatorCall {
    ActuatorCall::SetDuty {
        zone: zone.to_string(),
        duty,
    }
}

// ── MockActuator ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MockActuator {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
    refuse_manual: bool,
    refuse_auto: bool,
    /// (zone, duty) writes that report failure.
    failing_writes: Vec<(String, u8)>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_manual(mut self) -> Self {
        self.refuse_manual = true;
        self
    }

    pub fn refuse_auto(mut self) -> Self {
        self.refuse_auto = true;
        self
    }

    pub fn fail_write(mut self, zone: &str, duty: u8) -> Self {
        self.failing_writes.push((zone.to_string(), duty));
        self
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls after the startup handshake and sanity writes.
    pub fn calls_after_startup(&self, zones: usize) -> Vec<ActuatorCall> {
        self.calls().into_iter().skip(1 + zones).collect()
    }

    fn record(&self, call: ActuatorCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn refused(what: &str) -> GatewayError {
    GatewayError::Status {
        command: what.to_string(),
        code: Some(1),
        stderr: "refused by mock".to_string(),
    }
}

impl ActuatorGateway for MockActuator {
    async fn enable_manual_mode(&mut self) -> Result<(), GatewayError> {
        self.record(ActuatorCall::EnableManual);
        if self.refuse_manual {
            return Err(refused("enable manual"));
        }
        Ok(())
    }

    async fn enable_auto_mode(&mut self) -> Result<(), GatewayError> {
        self.record(ActuatorCall::EnableAuto);
        if self.refuse_auto {
            return Err(refused("enable auto"));
        }
        Ok(())
    }

    async fn set_zone_duty(&mut self, zone: &ZoneId, percent: u8) -> Result<(), GatewayError> {
        self.record(set(zone.as_str(), percent));
        if self
            .failing_writes
            .iter()
            .any(|(z, d)| z == zone.as_str() && *d == percent)
        {
            return Err(GatewayError::Io {
                path: format!("/mock/{zone}").into(),
                source: io::Error::other("write failed"),
            });
        }
        Ok(())
    }
}

// ── MockSensors ───────────────────────────────────────────────

/// Scripted sensors. Each sensor yields its queued values in order and then
/// repeats the last one. `None` is an invalid reading.
#[derive(Debug, Clone, Default)]
pub struct MockSensors {
    scripts: HashMap<String, VecDeque<Option<i32>>>,
    reads: Arc<Mutex<HashMap<String, usize>>>,
    /// Request shutdown once `sensor` has been read `n` times.
    shutdown_after: Option<(String, usize, ControlHandle)>,
    /// Panic on the `n`th read of `sensor`.
    panic_on: Option<(String, usize)>,
}

impl MockSensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, name: &str, values: &[Option<i32>]) -> Self {
        self.scripts
            .insert(name.to_string(), values.iter().copied().collect());
        self
    }

    pub fn constant(self, name: &str, celsius: i32) -> Self {
        self.script(name, &[Some(celsius)])
    }

    pub fn shutdown_after(mut self, name: &str, reads: usize, handle: ControlHandle) -> Self {
        self.shutdown_after = Some((name.to_string(), reads, handle));
        self
    }

    pub fn panic_on(mut self, name: &str, read: usize) -> Self {
        self.panic_on = Some((name.to_string(), read));
        self
    }

    pub fn reads(&self, name: &str) -> usize {
        self.reads.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl SensorGateway for MockSensors {
    async fn read_sensor(&mut self, name: &str) -> SensorReading {
        let count = {
            let mut reads = self.reads.lock().unwrap();
            let count = reads.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some((sensor, n, handle)) = &self.shutdown_after {
            if sensor == name && count == *n {
                handle.request_shutdown();
            }
        }
        if let Some((sensor, n)) = &self.panic_on {
            if sensor == name && count == *n {
                panic!("sensor {name} blew up on read {count}");
            }
        }

        let value = match self.scripts.get_mut(name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
            Some(queue) => queue.front().copied().flatten(),
            None => None,
        };
        SensorReading {
            name: name.to_string(),
            celsius: value,
        }
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Settings ──────────────────────────────────────────────────

pub const CPU_SENSOR: &str = "CPU Temp";
pub const PERIPHERAL_SENSOR: &str = "Peripheral Temp";

/// Reference deployment: two sensors, two zones, the default curve
/// `{0:15, 70:60, 75:70, 80:80, 85:90, 90:100}`, emergency at 95C.
pub fn settings() -> ControlSettings {
    ControlSettings {
        sensors: vec![CPU_SENSOR.to_string(), PERIPHERAL_SENSOR.to_string()],
        zones: vec![ZoneId::from("cpu"), ZoneId::from("peripheral")],
        curve: FanCurve::default(),
        poll_interval: Duration::from_secs(1),
        emergency_c: 95,
        startup_duty: 50,
        heartbeat_cycles: 3,
    }
}
