//! Raw stored shapes and their mapping to canonical models.
//!
//! Normalization never fails: documents that cannot be mapped yield `None`
//! and are dropped by the caller.

pub mod alert;
pub mod group;
pub mod invitation;
pub mod location;

pub use alert::{normalize_alert, normalize_alert_document, RawAlert};
pub use group::{merge, plan_backfill, BackfillPlan, GroupShape, RawGroup};
pub use invitation::{parse_account, parse_invitation};
pub use location::normalize_location;
