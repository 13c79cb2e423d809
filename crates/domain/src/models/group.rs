//! Group ("circle") domain models.
//!
//! A group is stored in two coexisting physical shapes: the web shape keys
//! members by email (`members`, `pendingInvitations`), the mobile shape keeps
//! member records (`miembros`). [`UnifiedGroup`] is the canonical union.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Name used when neither shape carries one.
pub const DEFAULT_GROUP_NAME: &str = "Grupo Sin Nombre";

/// Phone written into synthesized mobile member records.
pub const PHONE_PLACEHOLDER: &str = "0000000000";

/// Group type written by web-created groups.
pub const DEFAULT_GROUP_TYPE: &str = "familia";

lazy_static::lazy_static! {
    static ref GROUP_CODE_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Z0-9]{6}$").unwrap();
}

/// Returns true if the join code has the six uppercase alphanumerics format.
pub fn is_valid_group_code(code: &str) -> bool {
    GROUP_CODE_REGEX.is_match(code)
}

/// Role of a member in the mobile shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }

    /// Role for `email` in a group created by `created_by`.
    pub fn for_member(email: &str, created_by: Option<&str>) -> Self {
        if created_by == Some(email) {
            MemberRole::Admin
        } else {
            MemberRole::Member
        }
    }
}

impl FromStr for MemberRole {
    type Err = String;

    /// Mobile clients have written `familiar` for plain members.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" | "owner" => Ok(MemberRole::Admin),
            "member" | "familiar" => Ok(MemberRole::Member),
            _ => Err(format!("Invalid member role: {}", s)),
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the mobile `miembros` array, in its stored shape.
///
/// Clients have stored nulls and numbers in these fields; every field reads
/// leniently so no entry is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMember {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uid: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub rol: Option<String>,
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

impl MobileMember {
    pub fn role(&self) -> Option<MemberRole> {
        self.rol.as_deref().and_then(|r| r.parse().ok())
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(MemberRole::Admin)
    }
}

/// Canonical group record merged from both physical shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_by: String,
    /// Member emails.
    pub members: Vec<String>,
    /// Member account identifiers.
    pub members_uids: Vec<String>,
    pub pending_invitations: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub is_auto_synced: bool,
    pub last_sync_update: Option<DateTime<Utc>>,
    // Mobile-shape fields, passed through untouched.
    pub codigo: Option<String>,
    pub nombre: Option<String>,
    pub tipo: Option<String>,
    pub creator: Option<String>,
    pub miembros: Option<Vec<MobileMember>>,
}

impl UnifiedGroup {
    pub fn has_member(&self, email: &str) -> bool {
        self.members.iter().any(|m| m == email)
    }
}

/// Request payload for creating a group in both shapes at once.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    #[serde(default)]
    pub description: String,

    #[validate(email(message = "Creator must be a valid email address"))]
    pub created_by: String,

    /// Initial member emails. The creator is added when missing.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Summary returned by the dual-shape backfill sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub processed: usize,
    pub updated: usize,
    pub errors: usize,
    pub failures: Vec<String>,
}

/// How many of a user's groups already carry both shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHealth {
    pub total_groups: usize,
    pub synced_groups: usize,
    /// Rounded percentage; 100 when the user has no groups.
    pub health_percentage: u32,
    /// Ids of groups still missing one shape.
    pub needs_update: Vec<String>,
}

impl SyncHealth {
    pub fn from_counts(total_groups: usize, synced_groups: usize, needs_update: Vec<String>) -> Self {
        let health_percentage = if total_groups == 0 {
            100
        } else {
            ((synced_groups as f64 / total_groups as f64) * 100.0).round() as u32
        };
        Self {
            total_groups,
            synced_groups,
            health_percentage,
            needs_update,
        }
    }
}
