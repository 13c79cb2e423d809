//! Group invitation domain models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Days an invitation stays answerable.
pub const INVITATION_TTL_DAYS: i64 = 7;

/// Invitation lifecycle state. Only `Pending` may transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "rejected" => Ok(InvitationStatus::Rejected),
            _ => Err(format!("Invalid invitation status: {}", s)),
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invitee's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationResponse {
    Accept,
    Reject,
}

impl InvitationResponse {
    pub fn outcome(&self) -> InvitationStatus {
        match self {
            InvitationResponse::Accept => InvitationStatus::Accepted,
            InvitationResponse::Reject => InvitationStatus::Rejected,
        }
    }
}

/// A pending membership offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub group_id: String,
    pub group_name: String,
    pub inviter_email: String,
    pub inviter_name: String,
    pub invitee_email: String,
    pub status: InvitationStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Invitations without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }
}

/// Expiry instant for an invitation created at `created_at`.
pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::days(INVITATION_TTL_DAYS)
}

/// Request payload for inviting someone to a group.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewInvitation {
    #[validate(length(min = 1, message = "Group id is required"))]
    pub group_id: String,

    #[validate(email(message = "Invitee must be a valid email address"))]
    pub invitee_email: String,

    #[validate(email(message = "Inviter must be a valid email address"))]
    pub inviter_email: String,

    #[validate(length(max = 100, message = "Inviter name must be at most 100 characters"))]
    pub inviter_name: String,
}
