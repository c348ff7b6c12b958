// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Cooling zones and the record of what was last written to each.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque name of an independently addressable group of fans, e.g. "cpu".
///
/// Gateways map the name to hardware addresses; the controller never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Last confirmed duty for one zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneState {
    /// `None` until the first successful write.
    pub last_duty: Option<u8>,
}

/// Tracks the last successfully written duty per zone.
///
/// Updated only after the actuator confirms a write, so a failed write is
/// retried on the next decision.
#[derive(Debug, Clone)]
pub struct ZoneTracker {
    zones: Vec<(ZoneId, ZoneState)>,
}

impl ZoneTracker {
    pub fn new(zones: &[ZoneId]) -> Self {
        Self {
            zones: zones
                .iter()
                .map(|z| (z.clone(), ZoneState::default()))
                .collect(),
        }
    }

    /// True when `zone` has never been written or holds a different duty.
    pub fn should_write(&self, zone: &ZoneId, target: u8) -> bool {
        self.last_duty(zone) != Some(target)
    }

    pub fn record_written(&mut self, zone: &ZoneId, duty: u8) {
        match self.zones.iter_mut().find(|(z, _)| z == zone) {
            Some((_, state)) => state.last_duty = Some(duty),
            None => self.zones.push((
                zone.clone(),
                ZoneState {
                    last_duty: Some(duty),
                },
            )),
        }
    }

    pub fn last_duty(&self, zone: &ZoneId) -> Option<u8> {
        self.state(zone).and_then(|s| s.last_duty)
    }

    pub fn state(&self, zone: &ZoneId) -> Option<&ZoneState> {
        self.zones.iter().find(|(z, _)| z == zone).map(|(_, s)| s)
    }

    /// Zones in configuration order.
    pub fn zones(&self) -> impl Iterator<Item = &ZoneId> {
        self.zones.iter().map(|(z, _)| z)
    }
}
