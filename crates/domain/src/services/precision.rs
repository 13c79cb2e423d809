//! GPS precision gate applied before a location report is stored.

use serde::Deserialize;
use thiserror::Error;

use crate::models::PrecisionLevel;

/// Rejection reasons of the precision gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrecisionError {
    #[error("GPS accuracy is required")]
    MissingAccuracy,

    #[error("GPS accuracy is {actual:.0} m; {required:.0} m required")]
    TooImprecise { actual: f64, required: f64 },
}

/// Outcome of an accepted report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionCheck {
    /// Accuracy rounded to whole meters.
    pub accuracy: f64,
    pub level: PrecisionLevel,
    /// Accepted but worse than the warning threshold.
    pub low_precision: bool,
}

/// Accuracy thresholds in meters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PrecisionPolicy {
    pub max_accuracy: f64,
    pub warning_accuracy: f64,
}

impl Default for PrecisionPolicy {
    fn default() -> Self {
        Self {
            max_accuracy: 50.0,
            warning_accuracy: 30.0,
        }
    }
}

impl PrecisionPolicy {
    pub fn new(max_accuracy: f64, warning_accuracy: f64) -> Self {
        Self {
            max_accuracy,
            warning_accuracy,
        }
    }

    pub fn check(&self, accuracy: Option<f64>) -> Result<PrecisionCheck, PrecisionError> {
        let actual = accuracy.ok_or(PrecisionError::MissingAccuracy)?;
        if !actual.is_finite() {
            return Err(PrecisionError::MissingAccuracy);
        }
        if actual > self.max_accuracy {
            return Err(PrecisionError::TooImprecise {
                actual,
                required: self.max_accuracy,
            });
        }
        Ok(PrecisionCheck {
            accuracy: actual.round(),
            level: PrecisionLevel::from_accuracy(actual),
            low_precision: actual > self.warning_accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_above_threshold() {
        let err = PrecisionPolicy::default().check(Some(51.0)).unwrap_err();
        assert!(matches!(err, PrecisionError::TooImprecise { .. }));

        let err = PrecisionPolicy::default().check(Some(75.0)).unwrap_err();
        assert_eq!(err.to_string(), "GPS accuracy is 75 m; 50 m required");
    }

    #[test]
    fn test_accepts_within_threshold() {
        let check = PrecisionPolicy::default().check(Some(49.0)).unwrap();
        assert!(check.low_precision);
        assert_eq!(check.level, PrecisionLevel::Low);

        let check = PrecisionPolicy::default().check(Some(12.4)).unwrap();
        assert!(!check.low_precision);
        assert_eq!(check.accuracy, 12.0);
        assert_eq!(check.level, PrecisionLevel::Good);
    }

    #[test]
    fn test_warning_band() {
        let check = PrecisionPolicy::default().check(Some(35.0)).unwrap();
        assert!(check.low_precision);
        assert!(!PrecisionPolicy::default().check(Some(30.0)).unwrap().low_precision);
    }

    #[test]
    fn test_missing_accuracy() {
        assert_eq!(
            PrecisionPolicy::default().check(None),
            Err(PrecisionError::MissingAccuracy)
        );
    }
}
