//! Location document normalization.

use shared::time::parse_instant;
use shared::validation::is_valid_position;
use shared::Document;

use crate::models::user::fallback_name;
use crate::models::Location;

/// Canonical location, or `None` when the stored position fails the validity
/// predicate. Coordinates are read from `lat`/`lng`, falling back to
/// `latitude`/`longitude`.
pub fn normalize_location(doc: &Document) -> Option<Location> {
    let latitude = doc.f64("lat").or_else(|| doc.f64("latitude"))?;
    let longitude = doc.f64("lng").or_else(|| doc.f64("longitude"))?;
    if !is_valid_position(latitude, longitude) {
        return None;
    }

    let user_email = doc.string("userEmail").unwrap_or_default();
    let user_name = doc
        .string("userName")
        .unwrap_or_else(|| fallback_name(&user_email));

    Some(Location {
        id: doc.id.clone(),
        user_id: doc.string("userId").unwrap_or_else(|| doc.id.clone()),
        user_email,
        user_name,
        latitude,
        longitude,
        accuracy: doc.f64("accuracy").unwrap_or(0.0),
        timestamp: doc.get("timestamp").and_then(parse_instant),
        is_online: doc.bool("isOnline").unwrap_or(false),
    })
}
