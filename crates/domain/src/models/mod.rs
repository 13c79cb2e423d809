//! Canonical domain models.

pub mod alert;
pub mod group;
pub mod invitation;
pub mod location;
pub mod user;

pub use alert::{Alert, AlertKind, AlertSource, AlertStats, Coordinates};
pub use group::{MobileMember, UnifiedGroup};
pub use invitation::{Invitation, InvitationStatus};
pub use location::{Location, LocationReport, PrecisionLevel};
pub use user::Account;
