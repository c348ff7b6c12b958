// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan curve definitions and step resolution.
//!
//! A curve maps a temperature to a duty percentage (0-100). Each step holds
//! its duty from its own threshold up to (but not including) the next one;
//! there is no interpolation between steps.

use crate::error::CurveError;
use serde::{Deserialize, Serialize};

/// A single step on a fan curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurveStep {
    /// Lower bound of this step in degrees Celsius (inclusive)
    pub temp_c: i32,
    /// Duty percentage applied from `temp_c` upward (0-100)
    pub duty: u8,
}

impl CurveStep {
    pub const fn new(temp_c: i32, duty: u8) -> Self {
        Self { temp_c, duty }
    }
}

/// An immutable, validated step curve.
///
/// Only constructible through [`FanCurve::new`], including when deserialized
/// from configuration, so every instance satisfies the table invariants:
/// at least one step, strictly increasing thresholds, duties within 0-100
/// and never decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CurveStep>", into = "Vec<CurveStep>")]
pub struct FanCurve {
    steps: Vec<CurveStep>,
}

impl FanCurve {
    /// Build a curve from steps given in ascending temperature order.
    pub fn new(steps: Vec<CurveStep>) -> Result<Self, CurveError> {
        if steps.is_empty() {
            return Err(CurveError::Empty);
        }
        for step in &steps {
            if step.duty > 100 {
                return Err(CurveError::DutyOutOfRange {
                    temp_c: step.temp_c,
                    duty: step.duty,
                });
            }
        }
        for pair in steps.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if hi.temp_c <= lo.temp_c {
                return Err(CurveError::Unsorted {
                    prev: lo.temp_c,
                    next: hi.temp_c,
                });
            }
            if hi.duty < lo.duty {
                return Err(CurveError::DecreasingDuty {
                    temp_c: hi.temp_c,
                    prev: lo.duty,
                    next: hi.duty,
                });
            }
        }
        Ok(Self { steps })
    }

    /// Resolve the duty for a given temperature.
    ///
    /// - At or above a threshold: that step's duty (inclusive lower bound)
    /// - Below the lowest threshold: the floor duty
    pub fn resolve(&self, temp_c: i32) -> u8 {
        // Number of steps whose threshold is <= temp_c.
        let idx = self.steps.partition_point(|s| s.temp_c <= temp_c);
        match idx {
            0 => self.floor_duty(),
            n => self.steps[n - 1].duty,
        }
    }

    /// Duty of the lowest step.
    pub fn floor_duty(&self) -> u8 {
        self.steps[0].duty
    }

    /// Threshold of the highest step.
    pub fn max_threshold(&self) -> i32 {
        self.steps[self.steps.len() - 1].temp_c
    }

    pub fn steps(&self) -> &[CurveStep] {
        &self.steps
    }
}

impl TryFrom<Vec<CurveStep>> for FanCurve {
    type Error = CurveError;

    fn try_from(steps: Vec<CurveStep>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

impl From<FanCurve> for Vec<CurveStep> {
    fn from(curve: FanCurve) -> Self {
        curve.steps
    }
}

impl Default for FanCurve {
    /// Quiet until 70C, then ten points per five degrees up to full at 90C.
    fn default() -> Self {
        Self {
            steps: vec![
                CurveStep::new(0, 15),
                CurveStep::new(70, 60),
                CurveStep::new(75, 70),
                CurveStep::new(80, 80),
                CurveStep::new(85, 90),
                CurveStep::new(90, 100),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_curve_is_valid() {
        let curve = FanCurve::default();
        assert_eq!(FanCurve::new(curve.steps().to_vec()), Ok(curve));
    }

    #[test]
    fn test_resolve_below_range() {
        let curve = FanCurve::new(vec![CurveStep::new(30, 20), CurveStep::new(60, 80)]).unwrap();
        assert_eq!(curve.resolve(10), 20);
        assert_eq!(curve.resolve(-40), 20);
    }

    #[test]
    fn test_resolve_above_range() {
        let curve = FanCurve::default();
        assert_eq!(curve.resolve(120), 100);
    }

    #[test]
    fn test_resolve_exact_threshold() {
        let curve = FanCurve::default();
        assert_eq!(curve.resolve(69), 15);
        assert_eq!(curve.resolve(70), 60);
        assert_eq!(curve.resolve(74), 60);
        assert_eq!(curve.resolve(75), 70);
    }

    #[test]
    fn test_resolve_holds_between_steps() {
        let curve = FanCurve::default();
        assert_eq!(curve.resolve(45), 15);
        assert_eq!(curve.resolve(50), 15);
        assert_eq!(curve.resolve(87), 90);
    }

    #[test]
    fn test_validation_empty() {
        assert_eq!(FanCurve::new(Vec::new()), Err(CurveError::Empty));
    }

    #[test]
    fn test_validation_unsorted() {
        let err = FanCurve::new(vec![CurveStep::new(50, 40), CurveStep::new(50, 60)]).unwrap_err();
        assert_eq!(err, CurveError::Unsorted { prev: 50, next: 50 });
    }

    #[test]
    fn test_validation_duty_range() {
        let err = FanCurve::new(vec![CurveStep::new(0, 101)]).unwrap_err();
        assert!(matches!(err, CurveError::DutyOutOfRange { duty: 101, .. }));
    }

    #[test]
    fn test_validation_decreasing_duty() {
        let err = FanCurve::new(vec![CurveStep::new(0, 50), CurveStep::new(60, 30)]).unwrap_err();
        assert!(matches!(err, CurveError::DecreasingDuty { temp_c: 60, .. }));
    }

    #[test]
    fn test_deserialize_rejects_invalid_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[allow(dead_code)]
            curve: FanCurve,
        }
        let bad = "[[curve]]\ntemp_c = 40\nduty = 50\n\n[[curve]]\ntemp_c = 20\nduty = 60\n";
        assert!(toml::from_str::<Wrapper>(bad).is_err());
    }
}
