//! Raw alert variants and their normalization.
//!
//! Alert emitters have linked alerts to groups through three different fields
//! and encoded the resolution flag in three different fields, two of them
//! with inverted polarity. Each of those concerns is classified into a small sum
//! type first; [`normalize_alert`] is then a total mapping from the classified
//! variants to an [`Alert`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::document::{nested_f64, value_as_f64};
use shared::time::parse_instant;
use shared::Document;
use tracing::debug;

use crate::models::alert::LOCATION_UNAVAILABLE;
use crate::models::{Alert, AlertKind, AlertSource, Coordinates};

const UNKNOWN_USER_NAME: &str = "Usuario desconocido";
const UNKNOWN_WEARABLE_EMAIL: &str = "desconocido@email.com";
const WEARABLE_USER_NAME: &str = "Usuario Smartwatch";
const WEARABLE_MESSAGE: &str = "Alerta de smartwatch";

/// Which stored field carries the resolution state, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMarker {
    /// `activatrue`: `true` means the alert is still active.
    ActivaTrue(bool),
    /// `resolved`: `true` means resolved.
    Resolved(bool),
    /// `activa`: `true` means the alert is still active.
    Activa(bool),
    Absent,
}

impl ResolutionMarker {
    pub fn classify(doc: &Document) -> Self {
        if let Some(active) = doc.bool("activatrue") {
            ResolutionMarker::ActivaTrue(active)
        } else if let Some(resolved) = doc.bool("resolved") {
            ResolutionMarker::Resolved(resolved)
        } else if let Some(active) = doc.bool("activa") {
            ResolutionMarker::Activa(active)
        } else {
            ResolutionMarker::Absent
        }
    }

    pub fn is_resolved(&self) -> bool {
        match *self {
            ResolutionMarker::ActivaTrue(active) => !active,
            ResolutionMarker::Resolved(resolved) => resolved,
            ResolutionMarker::Activa(active) => !active,
            ResolutionMarker::Absent => false,
        }
    }
}

/// Field linking an alert to its group(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupLink {
    /// `circleIds`: every group the alert was sent to.
    CircleIds(Vec<String>),
    /// `circleId`: legacy single group.
    CircleId(String),
    /// `groupId`: oldest single group field.
    GroupId(String),
    Unlinked,
}

impl GroupLink {
    pub fn classify(doc: &Document) -> Self {
        if let Some(ids) = doc.str_array("circleIds").filter(|ids| !ids.is_empty()) {
            GroupLink::CircleIds(ids)
        } else if let Some(id) = doc.string("circleId") {
            GroupLink::CircleId(id)
        } else if let Some(id) = doc.string("groupId") {
            GroupLink::GroupId(id)
        } else {
            GroupLink::Unlinked
        }
    }

    pub fn primary(&self) -> Option<&str> {
        match self {
            GroupLink::CircleIds(ids) => ids.first().map(String::as_str),
            GroupLink::CircleId(id) | GroupLink::GroupId(id) => Some(id),
            GroupLink::Unlinked => None,
        }
    }

    pub fn all(&self) -> Vec<String> {
        match self {
            GroupLink::CircleIds(ids) => ids.clone(),
            GroupLink::CircleId(id) | GroupLink::GroupId(id) => vec![id.clone()],
            GroupLink::Unlinked => Vec::new(),
        }
    }
}

/// Where the alert's position was recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPosition {
    /// `ubicacion: {lat, lng}` written by mobile emitters.
    Ubicacion(Coordinates),
    /// `coordinates: {lat, lng}`.
    CoordinateObject(Coordinates),
    /// `coordinates: [lng, lat]`.
    CoordinateArray(Coordinates),
    /// Free-text `location`.
    Text(String),
    Unavailable,
}

impl RawPosition {
    pub fn classify(doc: &Document) -> Self {
        if let Some(coords) = doc.object("ubicacion").and_then(object_coordinates) {
            return RawPosition::Ubicacion(coords);
        }
        if let Some(coords) = doc.object("coordinates").and_then(object_coordinates) {
            return RawPosition::CoordinateObject(coords);
        }
        if let Some(coords) = doc.array("coordinates").and_then(|a| array_coordinates(a)) {
            return RawPosition::CoordinateArray(coords);
        }
        match doc.string("location") {
            Some(text) => RawPosition::Text(text),
            None => RawPosition::Unavailable,
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            RawPosition::Ubicacion(c)
            | RawPosition::CoordinateObject(c)
            | RawPosition::CoordinateArray(c) => Some(*c),
            RawPosition::Text(_) | RawPosition::Unavailable => None,
        }
    }

    /// Human-readable location: coordinate label first, then stored text.
    pub fn label(&self) -> String {
        match self {
            RawPosition::Ubicacion(c)
            | RawPosition::CoordinateObject(c)
            | RawPosition::CoordinateArray(c) => c.label(),
            RawPosition::Text(text) => text.clone(),
            RawPosition::Unavailable => LOCATION_UNAVAILABLE.to_string(),
        }
    }
}

fn object_coordinates(fields: &shared::Fields) -> Option<Coordinates> {
    let lat = nested_f64(fields, "lat")?;
    let lng = nested_f64(fields, "lng")?;
    Some(Coordinates::new(lat, lng))
}

fn array_coordinates(items: &[Value]) -> Option<Coordinates> {
    match items {
        [lng, lat, ..] => Some(Coordinates::new(value_as_f64(lat)?, value_as_f64(lng)?)),
        _ => None,
    }
}

/// Stored timestamp state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    Missing,
    /// Present; `None` when the value cannot be read as an instant.
    Present(Option<DateTime<Utc>>),
}

impl RawTimestamp {
    fn classify(doc: &Document, fields: &[&str]) -> Self {
        fields
            .iter()
            .find_map(|field| doc.get(field))
            .map(|value| RawTimestamp::Present(parse_instant(value)))
            .unwrap_or(RawTimestamp::Missing)
    }
}

/// A stored alert document with every drifting concern classified.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAlert<'a> {
    pub doc: &'a Document,
    pub source: AlertSource,
    pub resolution: ResolutionMarker,
    pub link: GroupLink,
    pub position: RawPosition,
    pub timestamp: RawTimestamp,
}

impl<'a> RawAlert<'a> {
    pub fn classify(doc: &'a Document, source: AlertSource) -> Self {
        let timestamp = match source {
            AlertSource::Circle => RawTimestamp::classify(doc, &["timestamp"]),
            AlertSource::Smartwatch => RawTimestamp::classify(doc, &["timestamp", "createdAt"]),
        };
        Self {
            doc,
            source,
            resolution: ResolutionMarker::classify(doc),
            link: GroupLink::classify(doc),
            position: RawPosition::classify(doc),
            timestamp,
        }
    }
}

/// Maps a classified alert to its canonical form.
///
/// Returns `None` when the document has no timestamp at all. `fallback_group`
/// is the group the caller looked the alert up for and is used when the
/// document carries no link field.
pub fn normalize_alert(raw: &RawAlert<'_>, fallback_group: Option<&str>) -> Option<Alert> {
    let timestamp = match raw.timestamp {
        RawTimestamp::Missing => {
            debug!(alert_id = %raw.doc.id, source = ?raw.source, "Alert without timestamp dropped");
            return None;
        }
        RawTimestamp::Present(instant) => instant,
    };
    let doc = raw.doc;

    let mut group_ids = raw.link.all();
    if group_ids.is_empty() {
        if let Some(group) = fallback_group {
            group_ids.push(group.to_string());
        }
    }
    let group_id = raw
        .link
        .primary()
        .or(fallback_group)
        .map(str::to_string);

    let alert = match raw.source {
        AlertSource::Circle => Alert {
            id: doc.id.clone(),
            user_id: first_str(doc, &["emisorId", "userId"]).unwrap_or_default(),
            user_email: first_str(doc, &["email", "userEmail"]).unwrap_or_default(),
            user_name: first_str(doc, &["name", "userName"])
                .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string()),
            message: first_str(doc, &["mensaje", "message"]).unwrap_or_default(),
            location: raw.position.label(),
            coordinates: raw.position.coordinates(),
            timestamp,
            kind: doc
                .str("type")
                .map(|t| t.parse().unwrap_or(AlertKind::Other))
                .unwrap_or(AlertKind::Panic),
            resolved: raw.resolution.is_resolved(),
            group_ids,
            group_id,
            phone: doc.string("phone"),
            recipients: doc
                .str_array("destinatarios")
                .or_else(|| doc.str_array("recipients"))
                .unwrap_or_default(),
            device_id: doc.string("deviceId"),
            metadata: doc.get("metadata").cloned(),
            source: AlertSource::Circle,
        },
        AlertSource::Smartwatch => Alert {
            id: doc.id.clone(),
            user_id: first_str(doc, &["userId", "uid"]).unwrap_or_default(),
            user_email: first_str(doc, &["userEmail", "email"])
                .unwrap_or_else(|| UNKNOWN_WEARABLE_EMAIL.to_string()),
            user_name: first_str(doc, &["userName", "name"])
                .unwrap_or_else(|| WEARABLE_USER_NAME.to_string()),
            message: first_str(doc, &["message", "type"])
                .unwrap_or_else(|| WEARABLE_MESSAGE.to_string()),
            location: raw.position.label(),
            coordinates: raw.position.coordinates(),
            timestamp,
            kind: wearable_kind(doc.str("type")),
            resolved: raw.resolution.is_resolved(),
            group_ids,
            group_id,
            phone: doc.string("phone"),
            recipients: Vec::new(),
            device_id: doc.string("deviceId"),
            metadata: doc.get("metadata").cloned(),
            source: AlertSource::Smartwatch,
        },
    };
    Some(alert)
}

/// Classifies and normalizes in one step.
pub fn normalize_alert_document(
    doc: &Document,
    source: AlertSource,
    fallback_group: Option<&str>,
) -> Option<Alert> {
    normalize_alert(&RawAlert::classify(doc, source), fallback_group)
}

fn wearable_kind(raw: Option<&str>) -> AlertKind {
    match raw.and_then(|t| t.parse::<AlertKind>().ok()) {
        Some(kind @ (AlertKind::Sos | AlertKind::Fall | AlertKind::Heartrate | AlertKind::Other)) => {
            kind
        }
        _ => AlertKind::Smartwatch,
    }
}

fn first_str(doc: &Document, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| doc.string(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn circle(fields: Value) -> Document {
        Document::from_value("a1", fields)
    }

    #[test]
    fn test_activatrue_wins_over_resolved() {
        let doc = circle(json!({
            "timestamp": {"seconds": 10, "nanoseconds": 0},
            "activatrue": false,
            "resolved": false,
        }));
        let alert = normalize_alert_document(&doc, AlertSource::Circle, None).unwrap();
        assert!(alert.resolved);
    }

    #[test]
    fn test_resolved_field_alone() {
        let doc = circle(json!({"timestamp": 1000, "resolved": true}));
        assert!(
            normalize_alert_document(&doc, AlertSource::Circle, None)
                .unwrap()
                .resolved
        );
    }

    #[test]
    fn test_no_resolution_field_means_active() {
        let doc = circle(json!({"timestamp": 1000}));
        assert!(
            !normalize_alert_document(&doc, AlertSource::Circle, None)
                .unwrap()
                .resolved
        );
    }

    #[test]
    fn test_activa_polarity() {
        let doc = circle(json!({"timestamp": 1000, "activa": false}));
        assert!(
            normalize_alert_document(&doc, AlertSource::Circle, None)
                .unwrap()
                .resolved
        );
    }

    #[test]
    fn test_missing_timestamp_is_dropped() {
        let doc = circle(json!({"circleIds": ["g1"], "mensaje": "help"}));
        assert!(normalize_alert_document(&doc, AlertSource::Circle, Some("g1")).is_none());
    }

    #[test]
    fn test_unparseable_timestamp_is_kept() {
        let doc = circle(json!({"timestamp": "whenever"}));
        let alert = normalize_alert_document(&doc, AlertSource::Circle, None).unwrap();
        assert_eq!(alert.timestamp, None);
    }

    #[test]
    fn test_circle_aliases() {
        let doc = circle(json!({
            "timestamp": 1000,
            "emisorId": "u1",
            "userEmail": "ana@x.com",
            "mensaje": "auxilio",
            "ubicacion": {"lat": 19.4326, "lng": -99.1332},
            "circleIds": ["g1", "g2"],
            "destinatarios": ["b@x.com"],
            "type": "geofence",
        }));
        let alert = normalize_alert_document(&doc, AlertSource::Circle, Some("g9")).unwrap();
        assert_eq!(alert.user_id, "u1");
        assert_eq!(alert.user_email, "ana@x.com");
        assert_eq!(alert.user_name, "Usuario desconocido");
        assert_eq!(alert.message, "auxilio");
        assert_eq!(alert.location, "19.432600, -99.133200");
        assert_eq!(alert.coordinates, Some(Coordinates::new(19.4326, -99.1332)));
        assert_eq!(alert.group_id.as_deref(), Some("g1"));
        assert_eq!(alert.group_ids, vec!["g1", "g2"]);
        assert_eq!(alert.recipients, vec!["b@x.com"]);
        assert_eq!(alert.kind, AlertKind::Geofence);
    }

    #[test]
    fn test_location_fallbacks() {
        let doc = circle(json!({"timestamp": 1, "location": "Casa"}));
        let alert = normalize_alert_document(&doc, AlertSource::Circle, None).unwrap();
        assert_eq!(alert.location, "Casa");
        assert_eq!(alert.coordinates, None);

        let doc = circle(json!({"timestamp": 1}));
        let alert = normalize_alert_document(&doc, AlertSource::Circle, None).unwrap();
        assert_eq!(alert.location, LOCATION_UNAVAILABLE);

        let doc = circle(json!({"timestamp": 1, "coordinates": [-99.5, 19.5]}));
        let alert = normalize_alert_document(&doc, AlertSource::Circle, None).unwrap();
        assert_eq!(alert.coordinates, Some(Coordinates::new(19.5, -99.5)));
    }

    #[test]
    fn test_fallback_group_used_when_unlinked() {
        let doc = circle(json!({"timestamp": 1}));
        let alert = normalize_alert_document(&doc, AlertSource::Circle, Some("g7")).unwrap();
        assert_eq!(alert.group_id.as_deref(), Some("g7"));
        assert_eq!(alert.group_ids, vec!["g7"]);
        assert_eq!(alert.kind, AlertKind::Panic);
    }

    #[test]
    fn test_smartwatch_defaults() {
        let doc = Document::from_value(
            "w1",
            json!({
                "createdAt": {"seconds": 50},
                "type": "fall",
                "coordinates": {"lat": 10.0, "lng": 20.0},
                "deviceId": "watch-1",
            }),
        );
        let alert = normalize_alert_document(&doc, AlertSource::Smartwatch, None).unwrap();
        assert_eq!(alert.user_email, "desconocido@email.com");
        assert_eq!(alert.user_name, "Usuario Smartwatch");
        assert_eq!(alert.message, "fall");
        assert_eq!(alert.kind, AlertKind::Fall);
        assert_eq!(alert.source, AlertSource::Smartwatch);
        assert_eq!(alert.device_id.as_deref(), Some("watch-1"));
        assert_eq!(alert.timestamp.unwrap().timestamp(), 50);
    }

    #[test]
    fn test_smartwatch_unknown_type() {
        let doc = Document::from_value("w2", json!({"timestamp": 1, "type": "button"}));
        let alert = normalize_alert_document(&doc, AlertSource::Smartwatch, None).unwrap();
        assert_eq!(alert.kind, AlertKind::Smartwatch);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let doc = circle(json!({"timestamp": 5, "circleId": "g1", "activatrue": true}));
        let first = normalize_alert_document(&doc, AlertSource::Circle, None);
        let second = normalize_alert_document(&doc, AlertSource::Circle, None);
        assert_eq!(first, second);
    }
}
