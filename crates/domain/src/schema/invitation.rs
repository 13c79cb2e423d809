//! Invitation and account document parsing.

use shared::time::parse_instant;
use shared::Document;

use crate::models::user::{fallback_name, PresenceStatus};
use crate::models::{Account, Invitation, InvitationStatus};

/// Parses an invitation document. Documents without a group or invitee, or
/// with an unknown status, are skipped.
pub fn parse_invitation(doc: &Document) -> Option<Invitation> {
    let group_id = doc.string("groupId")?;
    let invitee_email = doc.string("inviteeEmail")?;
    let status = match doc.str("status") {
        Some(status) => status.parse::<InvitationStatus>().ok()?,
        None => InvitationStatus::Pending,
    };

    Some(Invitation {
        id: doc.id.clone(),
        group_id,
        group_name: doc.string("groupName").unwrap_or_default(),
        inviter_email: doc.string("inviterEmail").unwrap_or_default(),
        inviter_name: doc.string("inviterName").unwrap_or_default(),
        invitee_email,
        status,
        created_at: doc.get("createdAt").and_then(parse_instant),
        expires_at: doc.get("expiresAt").and_then(parse_instant),
    })
}

/// Parses an account document. Accounts need an email.
pub fn parse_account(doc: &Document) -> Option<Account> {
    let email = doc.string("email")?;
    let name = doc
        .string("name")
        .unwrap_or_else(|| fallback_name(&email));
    Some(Account {
        id: doc.id.clone(),
        name,
        phone: doc.string("phone"),
        current_group_id: doc.string("currentGroupId"),
        status: match doc.str("status") {
            Some("online") => Some(PresenceStatus::Online),
            Some("offline") => Some(PresenceStatus::Offline),
            _ => None,
        },
        email,
    })
}
