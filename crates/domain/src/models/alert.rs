//! Alert domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Text shown when an alert carries neither coordinates nor a location string.
pub const LOCATION_UNAVAILABLE: &str = "Ubicación no disponible";

/// Category of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Panic,
    Geofence,
    Manual,
    Smartwatch,
    Sos,
    Fall,
    Heartrate,
    Other,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Panic => "panic",
            AlertKind::Geofence => "geofence",
            AlertKind::Manual => "manual",
            AlertKind::Smartwatch => "smartwatch",
            AlertKind::Sos => "sos",
            AlertKind::Fall => "fall",
            AlertKind::Heartrate => "heartrate",
            AlertKind::Other => "other",
        }
    }

    /// Returns true for categories emitted by wearable devices.
    pub fn is_wearable(&self) -> bool {
        matches!(
            self,
            AlertKind::Smartwatch | AlertKind::Sos | AlertKind::Fall | AlertKind::Heartrate
        )
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "panic" => Ok(AlertKind::Panic),
            "geofence" => Ok(AlertKind::Geofence),
            "manual" => Ok(AlertKind::Manual),
            "smartwatch" => Ok(AlertKind::Smartwatch),
            "sos" => Ok(AlertKind::Sos),
            "fall" => Ok(AlertKind::Fall),
            "heartrate" => Ok(AlertKind::Heartrate),
            "other" => Ok(AlertKind::Other),
            _ => Err(format!("Invalid alert kind: {}", s)),
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which family of emitters produced the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSource {
    Circle,
    Smartwatch,
}

impl AlertSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSource::Circle => "circle",
            AlertSource::Smartwatch => "smartwatch",
        }
    }
}

impl FromStr for AlertSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "circle" => Ok(AlertSource::Circle),
            "smartwatch" => Ok(AlertSource::Smartwatch),
            _ => Err(format!("Invalid alert source: {}", s)),
        }
    }
}

impl fmt::Display for AlertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Six-decimal "lat, lng" text used as the alert location label.
    pub fn label(&self) -> String {
        format!("{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Canonical alert record.
///
/// `timestamp` is `None` when the stored timestamp exists but cannot be
/// converted to an instant; documents with no timestamp at all never become
/// an `Alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub message: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: AlertKind,
    pub resolved: bool,
    /// Every group the alert was addressed to.
    pub group_ids: Vec<String>,
    /// Primary owning group, if any.
    pub group_id: Option<String>,
    pub phone: Option<String>,
    pub recipients: Vec<String>,
    pub device_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub source: AlertSource,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

/// Counters over a set of alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub today: usize,
    pub this_week: usize,
    pub this_month: usize,
}

/// Request payload for writing an alert into the legacy `alerts` collection.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    #[validate(email(message = "User email must be a valid email address"))]
    pub user_email: String,

    #[validate(length(max = 100, message = "User name must be at most 100 characters"))]
    pub user_name: String,

    #[validate(length(max = 200, message = "Location must be at most 200 characters"))]
    pub location: String,

    pub coordinates: Option<Coordinates>,

    pub kind: AlertKind,

    pub group_id: Option<String>,

    #[validate(length(max = 500, message = "Message must be at most 500 characters"))]
    pub message: Option<String>,

    pub phone: Option<String>,
}

/// One alert to resolve in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRef {
    pub id: String,
    pub source: AlertSource,
}

/// Outcome of resolving several alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub resolved: usize,
    pub failed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_kind_from_str() {
        assert_eq!("panic".parse::<AlertKind>().unwrap(), AlertKind::Panic);
        assert_eq!("SOS".parse::<AlertKind>().unwrap(), AlertKind::Sos);
        assert_eq!(
            "heartrate".parse::<AlertKind>().unwrap(),
            AlertKind::Heartrate
        );
        assert!("earthquake".parse::<AlertKind>().is_err());
    }

    #[test]
    fn test_alert_kind_wearable() {
        assert!(AlertKind::Fall.is_wearable());
        assert!(AlertKind::Smartwatch.is_wearable());
        assert!(!AlertKind::Panic.is_wearable());
        assert!(!AlertKind::Other.is_wearable());
    }

    #[test]
    fn test_alert_source_display() {
        assert_eq!(AlertSource::Circle.to_string(), "circle");
        assert_eq!(AlertSource::Smartwatch.to_string(), "smartwatch");
    }

    #[test]
    fn test_coordinates_label() {
        assert_eq!(
            Coordinates::new(19.4326, -99.1332).label(),
            "19.432600, -99.133200"
        );
    }

    #[test]
    fn test_new_alert_validation() {
        let alert = NewAlert {
            user_id: "u1".to_string(),
            user_email: "not-an-email".to_string(),
            user_name: "Ana".to_string(),
            location: "Casa".to_string(),
            coordinates: None,
            kind: AlertKind::Manual,
            group_id: None,
            message: None,
            phone: None,
        };
        assert!(alert.validate().is_err());

        let alert = NewAlert {
            user_email: "ana@example.com".to_string(),
            ..alert
        };
        assert!(alert.validate().is_ok());
    }
}
