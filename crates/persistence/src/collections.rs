//! Collection names shared with the mobile and web clients.

/// Groups, in either member shape.
pub const GROUPS: &str = "circulos";
/// Alerts addressed to groups.
pub const CIRCLE_ALERTS: &str = "alertasCirculos";
/// Alerts written by wearables.
pub const SMARTWATCH_ALERTS: &str = "alertas";
/// First-generation web alerts.
pub const LEGACY_ALERTS: &str = "alerts";
pub const INVITATIONS: &str = "invitations";
/// Latest location per user, keyed by user id.
pub const LOCATIONS: &str = "ubicaciones";
pub const USERS: &str = "users";
