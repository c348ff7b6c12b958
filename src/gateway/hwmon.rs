// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! hwmon sysfs backend.
//!
//! Scans `/sys/class/hwmon/` for PWM outputs and temperature inputs. Zones
//! are configured as lists of PWM ids (e.g. "hwmon3/pwm1"); sensors are
//! addressed by id ("hwmon3/temp1") or by their `tempN_label`.

use super::{ActuatorGateway, SensorGateway, SensorReading, scale_percent};
use crate::error::GatewayError;
use crate::zone::ZoneId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// `pwmN_enable` values.
const PWM_ENABLE_MANUAL: u8 = 1;
const PWM_ENABLE_AUTO: u8 = 2;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwmonConfig {
    /// hwmon class directory; overridable for testing.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Zone name -> PWM ids driven as that zone.
    #[serde(default)]
    pub zones: BTreeMap<String, Vec<String>>,
}

impl Default for HwmonConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            zones: BTreeMap::new(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(HWMON_ROOT)
}

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A discovered PWM output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fan {
    /// Unique identifier, e.g. "hwmon3/pwm1"
    pub id: String,
    /// Absolute path to the `pwmN` file
    pub pwm_path: PathBuf,
    /// Absolute path to the `pwmN_enable` file
    pub pwm_enable_path: PathBuf,
}

/// A discovered temperature sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempSensor {
    /// Unique identifier, e.g. "hwmon3/temp1"
    pub id: String,
    /// Human-readable label if available
    pub label: Option<String>,
    /// Absolute path to the `tempN_input` file (millidegrees C)
    pub input_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Scan `root` and return all PWM outputs.
pub fn discover_fans(root: &Path) -> io::Result<Vec<Fan>> {
    let mut fans = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let hwmon_dir = entry.path();
        let hwmon_basename = entry.file_name().to_string_lossy().to_string();

        for n in 1..=16 {
            let pwm_path = hwmon_dir.join(format!("pwm{n}"));
            if !pwm_path.exists() {
                break;
            }

            fans.push(Fan {
                id: format!("{hwmon_basename}/pwm{n}"),
                pwm_enable_path: hwmon_dir.join(format!("pwm{n}_enable")),
                pwm_path,
            });
        }
    }

    fans.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(fans)
}

/// Scan `root` and return all temperature sensors.
pub fn discover_temp_sensors(root: &Path) -> io::Result<Vec<TempSensor>> {
    let mut sensors = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let hwmon_dir = entry.path();
        let hwmon_basename = entry.file_name().to_string_lossy().to_string();

        for n in 1..=32 {
            let input_path = hwmon_dir.join(format!("temp{n}_input"));
            if !input_path.exists() {
                break;
            }

            sensors.push(TempSensor {
                id: format!("{hwmon_basename}/temp{n}"),
                label: read_trimmed(&hwmon_dir.join(format!("temp{n}_label"))),
                input_path,
            });
        }
    }

    sensors.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(sensors)
}

/// Read a sensor in whole degrees Celsius, rounded.
pub fn read_temp(sensor: &TempSensor) -> Option<i32> {
    read_trimmed(&sensor.input_path)
        .and_then(|s| s.parse::<i64>().ok())
        .map(|millic| (millic as f64 / 1000.0).round() as i32)
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Sensor and actuator gateway over hwmon sysfs files.
#[derive(Debug, Clone)]
pub struct HwmonGateway {
    sensors: Vec<TempSensor>,
    zones: BTreeMap<ZoneId, Vec<Fan>>,
}

impl HwmonGateway {
    /// Discover hardware under `config.root` and resolve zone mappings.
    pub fn discover(config: &HwmonConfig) -> Result<Self, GatewayError> {
        let io_err = |source| GatewayError::Io {
            path: config.root.clone(),
            source,
        };
        let fans = discover_fans(&config.root).map_err(io_err)?;
        let sensors = discover_temp_sensors(&config.root).map_err(io_err)?;

        log::info!(
            "Discovered {} PWM output(s) and {} temp sensor(s) under {}",
            fans.len(),
            sensors.len(),
            config.root.display()
        );

        let mut zones = BTreeMap::new();
        for (zone, pwm_ids) in &config.zones {
            let mut members = Vec::with_capacity(pwm_ids.len());
            for id in pwm_ids {
                let fan = fans
                    .iter()
                    .find(|f| &f.id == id)
                    .ok_or_else(|| GatewayError::Io {
                        path: config.root.join(id),
                        source: io::Error::new(io::ErrorKind::NotFound, "no such PWM output"),
                    })?;
                members.push(fan.clone());
            }
            zones.insert(ZoneId::new(zone.as_str()), members);
        }

        Ok(Self { sensors, zones })
    }

    pub fn sensors(&self) -> &[TempSensor] {
        &self.sensors
    }

    /// Find a sensor by id, falling back to its label.
    pub fn find_sensor(&self, name: &str) -> Option<&TempSensor> {
        self.sensors
            .iter()
            .find(|s| s.id == name)
            .or_else(|| self.sensors.iter().find(|s| s.label.as_deref() == Some(name)))
    }

    fn zone(&self, zone: &ZoneId) -> Result<&[Fan], GatewayError> {
        self.zones
            .get(zone)
            .map(Vec::as_slice)
            .ok_or_else(|| GatewayError::UnknownZone(zone.clone()))
    }

    fn mapped_fans(&self) -> impl Iterator<Item = &Fan> {
        self.zones.values().flatten()
    }
}

impl SensorGateway for HwmonGateway {
    async fn read_sensor(&mut self, name: &str) -> SensorReading {
        let Some(sensor) = self.find_sensor(name) else {
            log::debug!("{}", GatewayError::UnknownSensor(name.to_string()));
            return SensorReading::invalid(name);
        };
        match read_temp(sensor) {
            Some(c) => SensorReading::valid(name, c),
            None => SensorReading::invalid(name),
        }
    }
}

impl ActuatorGateway for HwmonGateway {
    async fn enable_manual_mode(&mut self) -> Result<(), GatewayError> {
        for fan in self.mapped_fans() {
            write_value(&fan.pwm_enable_path, PWM_ENABLE_MANUAL)?;
        }
        Ok(())
    }

    /// Hand every mapped output back to the driver, continuing past failures.
    /// Returns the first error once all outputs were attempted.
    async fn enable_auto_mode(&mut self) -> Result<(), GatewayError> {
        let mut first_err = None;
        for fan in self.mapped_fans() {
            if let Err(e) = write_value(&fan.pwm_enable_path, PWM_ENABLE_AUTO) {
                log::warn!("Failed to restore automatic control for {}: {e}", fan.id);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn set_zone_duty(&mut self, zone: &ZoneId, percent: u8) -> Result<(), GatewayError> {
        let pwm = scale_percent(percent, u8::MAX);
        for fan in self.zone(zone)? {
            write_value(&fan.pwm_path, pwm)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_value(path: &Path, value: u8) -> Result<(), GatewayError> {
    fs::write(path, format!("{value}")).map_err(|source| GatewayError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a fake hwmon tree with one chip carrying two PWM outputs and
    /// two temperature inputs. The caller removes the directory.
    fn fake_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("zonefan_hwmon_{name}_{}", std::process::id()));
        let chip = root.join("hwmon0");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&chip).unwrap();
        for (file, content) in [
            ("name", "nct6775\n"),
            ("pwm1", "128\n"),
            ("pwm1_enable", "2\n"),
            ("pwm2", "128\n"),
            ("pwm2_enable", "2\n"),
            ("temp1_input", "45499\n"),
            ("temp1_label", "CPUTIN\n"),
            ("temp2_input", "garbage\n"),
        ] {
            fs::write(chip.join(file), content).unwrap();
        }
        root
    }

    fn config(root: &Path) -> HwmonConfig {
        HwmonConfig {
            root: root.to_path_buf(),
            zones: BTreeMap::from([
                ("cpu".to_string(), vec!["hwmon0/pwm1".to_string()]),
                ("peripheral".to_string(), vec!["hwmon0/pwm2".to_string()]),
            ]),
        }
    }

    #[test]
    fn test_discovery() {
        let root = fake_root("discovery");
        let fans = discover_fans(&root).unwrap();
        let sensors = discover_temp_sensors(&root).unwrap();
        assert_eq!(
            fans.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            ["hwmon0/pwm1", "hwmon0/pwm2"]
        );
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].label.as_deref(), Some("CPUTIN"));
        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_read_by_id_and_label() {
        let root = fake_root("read");
        let mut gw = HwmonGateway::discover(&config(&root)).unwrap();
        assert_eq!(gw.read_sensor("hwmon0/temp1").await, SensorReading::valid("hwmon0/temp1", 45));
        assert_eq!(gw.read_sensor("CPUTIN").await, SensorReading::valid("CPUTIN", 45));
        assert!(!gw.read_sensor("hwmon0/temp2").await.is_valid());
        assert!(!gw.read_sensor("missing").await.is_valid());
        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_mode_and_duty_writes() {
        let root = fake_root("write");
        let chip = root.join("hwmon0");
        let mut gw = HwmonGateway::discover(&config(&root)).unwrap();

        gw.enable_manual_mode().await.unwrap();
        assert_eq!(read_trimmed(&chip.join("pwm1_enable")).as_deref(), Some("1"));
        assert_eq!(read_trimmed(&chip.join("pwm2_enable")).as_deref(), Some("1"));

        gw.set_zone_duty(&ZoneId::from("cpu"), 60).await.unwrap();
        assert_eq!(read_trimmed(&chip.join("pwm1")).as_deref(), Some("153"));
        assert_eq!(read_trimmed(&chip.join("pwm2")).as_deref(), Some("128"));

        gw.enable_auto_mode().await.unwrap();
        assert_eq!(read_trimmed(&chip.join("pwm1_enable")).as_deref(), Some("2"));
        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_auto_mode_continues_past_unwritable_output() {
        let root = fake_root("auto_partial");
        let chip = root.join("hwmon0");
        let mut gw = HwmonGateway::discover(&config(&root)).unwrap();
        gw.enable_manual_mode().await.unwrap();

        // A directory in place of pwm1_enable makes that write fail.
        fs::remove_file(chip.join("pwm1_enable")).unwrap();
        fs::create_dir(chip.join("pwm1_enable")).unwrap();

        let err = gw.enable_auto_mode().await.unwrap_err();
        assert!(matches!(err, GatewayError::Io { ref path, .. } if path.ends_with("pwm1_enable")));
        assert_eq!(read_trimmed(&chip.join("pwm2_enable")).as_deref(), Some("2"));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_sensor_listing() {
        let root = fake_root("listing");
        let gw = HwmonGateway::discover(&config(&root)).unwrap();
        let ids: Vec<&str> = gw.sensors().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["hwmon0/temp1", "hwmon0/temp2"]);
        assert_eq!(gw.find_sensor("CPUTIN").map(|s| s.id.as_str()), Some("hwmon0/temp1"));
        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_unknown_zone_is_an_error() {
        let root = fake_root("unknown_zone");
        let mut gw = HwmonGateway::discover(&config(&root)).unwrap();
        let err = gw.set_zone_duty(&ZoneId::from("gpu"), 50).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownZone(_)));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_unmapped_pwm_fails_discovery() {
        let root = fake_root("unmapped");
        let mut cfg = config(&root);
        cfg.zones.insert("gpu".into(), vec!["hwmon0/pwm9".into()]);
        assert!(HwmonGateway::discover(&cfg).is_err());
        let _ = fs::remove_dir_all(&root);
    }
}
