//! Common validation utilities.

use validator::ValidationError;

/// Returns true when the pair is a usable GPS fix: both components finite,
/// non-zero, and within the latitude/longitude ranges.
///
/// Zero on either axis is the placeholder several emitters wrote before a fix
/// was acquired, so it is treated as missing.
pub fn is_valid_position(lat: f64, lng: f64) -> bool {
    validate_latitude(lat).is_ok() && validate_longitude(lng).is_ok()
}

/// Validates that a latitude is a non-zero number within -90 to 90.
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if lat != 0.0 && (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some("Latitude must be a non-zero number between -90 and 90".into());
        Err(err)
    }
}

/// Validates that a longitude is a non-zero number within -180 to 180.
pub fn validate_longitude(lng: f64) -> Result<(), ValidationError> {
    if lng != 0.0 && (-180.0..=180.0).contains(&lng) {
        Ok(())
    } else {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some("Longitude must be a non-zero number between -180 and 180".into());
        Err(err)
    }
}

/// Validates that accuracy is a finite, non-negative number of meters.
pub fn validate_accuracy(accuracy: f64) -> Result<(), ValidationError> {
    if accuracy.is_finite() && accuracy >= 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("accuracy_range");
        err.message = Some("Accuracy must be non-negative".into());
        Err(err)
    }
}
