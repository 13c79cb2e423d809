//! Location domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A user's latest known position. At most one exists per user; the user id
/// is the document key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub accuracy: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_online: bool,
}

/// A position report from a device.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    /// Reported horizontal accuracy in meters. Required by the precision gate.
    #[validate(custom(function = "shared::validation::validate_accuracy"))]
    pub accuracy: Option<f64>,
}

impl LocationReport {
    pub fn new(latitude: f64, longitude: f64, accuracy: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
        }
    }
}

/// Precision bucket stored next to an accepted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionLevel {
    #[serde(rename = "excelente")]
    Excellent,
    #[serde(rename = "buena")]
    Good,
    #[serde(rename = "aceptable")]
    Acceptable,
    #[serde(rename = "baja")]
    Low,
}

impl PrecisionLevel {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy <= 10.0 {
            PrecisionLevel::Excellent
        } else if accuracy <= 20.0 {
            PrecisionLevel::Good
        } else if accuracy <= 30.0 {
            PrecisionLevel::Acceptable
        } else {
            PrecisionLevel::Low
        }
    }

    /// Label written to the location document.
    pub fn stored_label(&self) -> &'static str {
        match self {
            PrecisionLevel::Excellent => "excelente",
            PrecisionLevel::Good => "buena",
            PrecisionLevel::Acceptable => "aceptable",
            PrecisionLevel::Low => "baja",
        }
    }
}

/// Result of an accepted location report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedReport {
    pub user_id: String,
    /// Rounded accuracy that was stored.
    pub accuracy: f64,
    pub level: PrecisionLevel,
    /// True when accuracy is inside the warning band.
    pub low_precision: bool,
}

/// Whether a user is currently sharing location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleStatus {
    pub active: bool,
    pub last_update: Option<DateTime<Utc>>,
}

impl CircleStatus {
    pub fn inactive() -> Self {
        Self {
            active: false,
            last_update: None,
        }
    }
}

/// Summary of the orphaned location sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanSweepReport {
    pub found: usize,
    pub cleaned: usize,
    pub errors: Vec<String>,
}

/// Consistency report over accounts and their location documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDiagnosis {
    pub total_users: usize,
    /// Accounts that own a location document.
    pub users_with_locations: usize,
    /// Of those, how many hold a usable position.
    pub users_with_valid_coords: usize,
    /// Emails held by more than one account.
    pub duplicate_users: Vec<String>,
    /// Location ids with no matching account.
    pub orphaned_locations: Vec<String>,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl LocationDiagnosis {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Summary of the combined location repair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoFixReport {
    pub duplicates_cleaned: usize,
    pub orphans_cleaned: usize,
    /// Accounts that received a placeholder location document.
    pub users_fixed: usize,
    pub errors: Vec<String>,
}

/// Summary of the inactive location sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InactiveSweepReport {
    pub cleaned: usize,
    pub errors: usize,
}
