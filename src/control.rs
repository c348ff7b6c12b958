// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The control loop: sample, resolve, write, repeat.
//!
//! ```text
//!   Starting ──▶ Running ──▶ (shutdown request) ──▶ auto mode ──▶ Exit::Shutdown
//!      │            │
//!      └── fault ───┴──▶ SafetySupervisor::engage ──▶ Exit::Failsafe
//! ```
//!
//! Manual mode is held from the startup handshake until `run` returns, and
//! every path out of `run` after the handshake was attempted tries to hand
//! control back to the firmware. [`run_guarded`] extends that to panics.

use crate::curve::FanCurve;
use crate::error::StartupError;
use crate::events::{Event, EventSink};
use crate::gateway::{ActuatorGateway, SensorGateway};
use crate::safety::{self, ActuatorAction, Fault, SafetyState, SafetySupervisor};
use crate::zone::{ZoneId, ZoneTracker};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::time::{self, Duration, MissedTickBehavior};

/// Who owns the fans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Firmware decides fan speeds.
    Auto,
    /// This controller decides fan speeds.
    Manual,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Auto => write!(f, "auto"),
            ControlMode::Manual => write!(f, "manual"),
        }
    }
}

/// How the controller stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Stopped on request with no danger observed.
    Shutdown,
    /// Stopped by the safety supervisor.
    Failsafe(Fault),
}

impl Exit {
    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Shutdown)
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Shutdown => write!(f, "graceful shutdown"),
            Exit::Failsafe(fault) => write!(f, "failsafe after {fault}"),
        }
    }
}

/// Validated settings the loop runs with.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// Primary sensors; the hottest valid one drives the curve.
    pub sensors: Vec<String>,
    pub zones: Vec<ZoneId>,
    pub curve: FanCurve,
    pub poll_interval: Duration,
    /// Readings at or above this trip the failsafe.
    pub emergency_c: i32,
    /// Duty written to every zone as the startup sanity check.
    pub startup_duty: u8,
    /// Stable cycles between heartbeat events; 0 disables them.
    pub heartbeat_cycles: u64,
}

impl ControlSettings {
    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), StartupError> {
        let invalid = |msg: &str| Err(StartupError::InvalidSettings(msg.to_string()));

        if self.sensors.is_empty() {
            return invalid("no primary sensors");
        }
        if self.zones.is_empty() {
            return invalid("no zones");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll interval must be positive");
        }
        if !(1..=100).contains(&self.startup_duty) {
            return invalid("startup duty must be within 1-100");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Process control surface
// ---------------------------------------------------------------------------

/// Shared handle for requesting shutdown and observing whether the loop runs.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug, Default)]
struct HandleInner {
    shutdown: AtomicBool,
    running: AtomicBool,
    notify: Notify,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop. Interrupts the inter-cycle wait; a cycle in
    /// progress finishes first.
    pub fn request_shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent request is not lost.
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    fn set_running(&self, running: bool) {
        self.inner.running.store(running, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

enum Halt {
    Startup(StartupError),
    Fault(Fault),
}

pub struct ControlLoop<S, A, E> {
    settings: ControlSettings,
    sensors: S,
    actuator: A,
    sink: E,
    tracker: ZoneTracker,
    supervisor: SafetySupervisor,
    mode: ControlMode,
    handle: ControlHandle,
    stable_cycles: u64,
}

impl<S, A, E> ControlLoop<S, A, E>
where
    S: SensorGateway,
    A: ActuatorGateway,
    E: EventSink,
{
    pub fn new(settings: ControlSettings, sensors: S, actuator: A, sink: E) -> Self {
        let tracker = ZoneTracker::new(&settings.zones);
        let supervisor = SafetySupervisor::new(settings.emergency_c, settings.sensors.clone());
        Self {
            settings,
            sensors,
            actuator,
            sink,
            tracker,
            supervisor,
            mode: ControlMode::Auto,
            handle: ControlHandle::new(),
            stable_cycles: 0,
        }
    }

    /// Use an existing handle, e.g. one already wired to signal handlers.
    pub fn with_handle(mut self, handle: ControlHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn tracker(&self) -> &ZoneTracker {
        &self.tracker
    }

    pub fn safety_state(&self) -> SafetyState {
        self.supervisor.state()
    }

    /// Run until shutdown is requested or a fault trips the failsafe.
    ///
    /// `Err` means startup was abandoned before any actuator was touched,
    /// either because the settings are unusable or no sensor answered.
    pub async fn run(&mut self) -> Result<Exit, StartupError> {
        self.handle.set_running(true);
        self.sink.emit(&Event::Starting {
            sensors: self.settings.sensors.clone(),
            zones: self.settings.zones.clone(),
        });

        let outcome = match self.start().await {
            Ok(()) => self.supervise().await,
            Err(Halt::Fault(fault)) => Err(fault),
            Err(Halt::Startup(e)) => {
                self.sink.emit(&Event::StartupFailed { error: e.clone() });
                self.handle.set_running(false);
                return Err(e);
            }
        };

        let exit = match outcome {
            Ok(()) => self.shut_down().await,
            Err(fault) => self.fail_safe(fault).await,
        };

        self.sink.emit(&Event::Stopped { exit: exit.clone() });
        self.handle.set_running(false);
        Ok(exit)
    }

    async fn start(&mut self) -> Result<(), Halt> {
        self.settings.validate().map_err(Halt::Startup)?;

        let Some(celsius) = self.sample().await else {
            return Err(Halt::Startup(StartupError::NoValidReadings {
                sensors: self.settings.sensors.clone(),
            }));
        };

        if let Err(e) = self.actuator.enable_manual_mode().await {
            return Err(Halt::Fault(
                self.supervisor
                    .actuator_failed(ActuatorAction::EnableManual, e),
            ));
        }
        self.mode = ControlMode::Manual;
        self.sink.emit(&Event::ModeChanged {
            mode: ControlMode::Manual,
        });

        let duty = self.settings.startup_duty;
        for zone in self.settings.zones.clone() {
            self.apply(&zone, duty, celsius).await.map_err(Halt::Fault)?;
        }
        Ok(())
    }

    async fn supervise(&mut self) -> Result<(), Fault> {
        let mut ticker = time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.handle.wait_for_shutdown() => return Ok(()),
                _ = ticker.tick() => {}
            }
            self.cycle().await?;
        }
    }

    async fn cycle(&mut self) -> Result<(), Fault> {
        let danger = self.sample().await;
        let celsius = self.supervisor.assess(danger)?;
        let target = self.settings.curve.resolve(celsius);

        let mut changed = false;
        for zone in self.settings.zones.clone() {
            if self.tracker.should_write(&zone, target) {
                self.apply(&zone, target, celsius).await?;
                changed = true;
            }
        }

        if changed {
            self.stable_cycles = 0;
            return Ok(());
        }

        self.stable_cycles += 1;
        self.sink.emit(&Event::Stable {
            celsius,
            duty: target,
        });
        let every = self.settings.heartbeat_cycles;
        if every > 0 && self.stable_cycles % every == 0 {
            self.sink.emit(&Event::Heartbeat {
                celsius,
                duty: target,
                stable_cycles: self.stable_cycles,
            });
        }
        Ok(())
    }

    /// Max of the valid primary readings; `None` if there are none.
    async fn sample(&mut self) -> Option<i32> {
        let mut danger = None;
        for name in &self.settings.sensors {
            let reading = self.sensors.read_sensor(name).await;
            match reading.celsius {
                Some(c) => danger = danger.max(Some(c)),
                None => self.sink.emit(&Event::SensorMiss {
                    sensor: reading.name,
                }),
            }
        }
        danger
    }

    async fn apply(&mut self, zone: &ZoneId, duty: u8, celsius: i32) -> Result<(), Fault> {
        if let Err(e) = self.actuator.set_zone_duty(zone, duty).await {
            return Err(self.supervisor.actuator_failed(
                ActuatorAction::SetDuty {
                    zone: zone.clone(),
                    duty,
                },
                e,
            ));
        }
        let from = self.tracker.last_duty(zone);
        self.tracker.record_written(zone, duty);
        self.sink.emit(&Event::DutyChanged {
            zone: zone.clone(),
            from,
            to: duty,
            celsius,
        });
        Ok(())
    }

    async fn shut_down(&mut self) -> Exit {
        self.sink.emit(&Event::ShutdownRequested);
        if self.mode == ControlMode::Manual
            && safety::restore_auto(&mut self.actuator, &mut self.sink).await
        {
            self.mode = ControlMode::Auto;
        }
        Exit::Shutdown
    }

    async fn fail_safe(&mut self, fault: Fault) -> Exit {
        let zones = self.settings.zones.clone();
        let restored = self
            .supervisor
            .engage(&fault, &zones, &mut self.actuator, &mut self.sink)
            .await;
        if restored {
            self.mode = ControlMode::Auto;
        }
        Exit::Failsafe(fault)
    }
}

/// Run `control` on its own task. If the task panics, `fallback` hands fan
/// control back to the firmware before the panic is resumed on the caller.
pub async fn run_guarded<S, A, E>(
    mut control: ControlLoop<S, A, E>,
    mut fallback: A,
) -> Result<Exit, StartupError>
where
    S: SensorGateway + Send + 'static,
    A: ActuatorGateway + Send + 'static,
    E: EventSink + Send + 'static,
{
    let task = tokio::spawn(async move { control.run().await });
    let err = match task.await {
        Ok(result) => return result,
        Err(err) => err,
    };

    log::error!(target: "zonefan", "Control loop aborted ({err}); restoring automatic fan control");
    if let Err(e) = fallback.enable_auto_mode().await {
        log::error!(target: "zonefan", "Failed to restore automatic fan control: {e}");
    }
    match err.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(err) => std::panic::resume_unwind(Box::new(err.to_string())),
    }
}
