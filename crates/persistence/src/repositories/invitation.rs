//! Group invitations.

use chrono::Utc;
use domain::models::invitation::{expiry_for, InvitationResponse, NewInvitation};
use domain::models::{Invitation, InvitationStatus};
use domain::schema::{merge, parse_invitation};
use serde_json::json;
use shared::codes::generate_document_id;
use shared::time::to_store_timestamp;
use shared::Fields;
use tracing::info;
use validator::Validate;

use crate::collections::{GROUPS, INVITATIONS, USERS};
use crate::error::SyncError;
use crate::metrics::QueryTimer;
use crate::repositories::{GroupRepository, UserRepository};
use crate::store::{FieldUpdates, Query, SharedStore, WriteBatch};

/// Repository for invitation documents.
#[derive(Clone)]
pub struct InvitationRepository {
    store: SharedStore,
    users: UserRepository,
    groups: GroupRepository,
}

impl InvitationRepository {
    /// Creates a new InvitationRepository with the given store handle.
    pub fn new(store: SharedStore) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            groups: GroupRepository::new(store.clone()),
            store,
        }
    }

    /// Invites a registered user into a group they are not part of yet.
    ///
    /// The invitation and the group's pending entry are written together.
    pub async fn invite(&self, request: NewInvitation) -> Result<Invitation, SyncError> {
        request.validate()?;

        let invitee = self.users.require_by_email(&request.invitee_email).await?;
        let raw = self.groups.get_raw(&request.group_id).await?;
        if raw.is_member(&invitee.email, Some(&invitee.id)) {
            return Err(SyncError::Conflict(format!(
                "{} is already a member of the group",
                invitee.email
            )));
        }
        let group = merge(&raw);

        let now = Utc::now();
        let expires_at = expiry_for(now);
        let mut fields = Fields::new();
        fields.insert("groupId".into(), json!(group.id));
        fields.insert("groupName".into(), json!(group.name));
        fields.insert("inviterEmail".into(), json!(request.inviter_email));
        fields.insert("inviterName".into(), json!(request.inviter_name));
        fields.insert("inviteeEmail".into(), json!(invitee.email));
        fields.insert("status".into(), json!(InvitationStatus::Pending.as_str()));
        fields.insert("createdAt".into(), to_store_timestamp(now));
        fields.insert("expiresAt".into(), to_store_timestamp(expires_at));

        let id = generate_document_id();
        let mut batch = WriteBatch::new();
        batch.set(INVITATIONS, &id, fields);
        batch.update(
            GROUPS,
            &group.id,
            FieldUpdates::new().array_union("pendingInvitations", vec![json!(invitee.email)]),
        );

        let timer = QueryTimer::new("create_invitation");
        let result = self.store.commit(batch).await;
        timer.record();
        result?;

        info!(
            invitation_id = %id,
            group_id = %group.id,
            invitee = %invitee.email,
            "Invitation sent"
        );

        Ok(Invitation {
            id,
            group_id: group.id,
            group_name: group.name,
            inviter_email: request.inviter_email,
            inviter_name: request.inviter_name,
            invitee_email: invitee.email,
            status: InvitationStatus::Pending,
            created_at: Some(now),
            expires_at: Some(expires_at),
        })
    }

    pub async fn get(&self, id: &str) -> Result<Invitation, SyncError> {
        self.store
            .get(INVITATIONS, id)
            .await?
            .as_ref()
            .and_then(parse_invitation)
            .ok_or_else(|| SyncError::not_found("Invitation", id))
    }

    /// Accepts or rejects a pending invitation.
    ///
    /// Acceptance writes the invitation status, both member shapes, the
    /// pending-list removal and the invitee's current group in one batch.
    pub async fn respond(
        &self,
        id: &str,
        response: InvitationResponse,
    ) -> Result<Invitation, SyncError> {
        let mut invitation = self.get(id).await?;
        if !invitation.is_pending() {
            return Err(SyncError::Conflict(format!(
                "Invitation {} is already {}",
                id, invitation.status
            )));
        }
        let now = Utc::now();
        if response == InvitationResponse::Accept && invitation.is_expired(now) {
            return Err(SyncError::Conflict(format!("Invitation {} has expired", id)));
        }

        let status = response.outcome();
        let mut batch = WriteBatch::new();
        batch.update(
            INVITATIONS,
            id,
            FieldUpdates::new()
                .set("status", status.as_str())
                .set("respondedAt", to_store_timestamp(now)),
        );

        let pending_removal = vec![json!(invitation.invitee_email)];
        match response {
            InvitationResponse::Accept => {
                let raw = self.groups.get_raw(&invitation.group_id).await?;
                let account = self.users.require_by_email(&invitation.invitee_email).await?;
                let updates = self
                    .groups
                    .membership_updates(&raw, &account)
                    .await?
                    .unwrap_or_default()
                    .array_remove("pendingInvitations", pending_removal);
                batch.update(GROUPS, &raw.id, updates);
                batch.update(
                    USERS,
                    &account.id,
                    FieldUpdates::new().set("currentGroupId", raw.id.as_str()),
                );
            }
            InvitationResponse::Reject => {
                if self.store.get(GROUPS, &invitation.group_id).await?.is_some() {
                    batch.update(
                        GROUPS,
                        &invitation.group_id,
                        FieldUpdates::new().array_remove("pendingInvitations", pending_removal),
                    );
                }
            }
        }

        let timer = QueryTimer::new("respond_invitation");
        let result = self.store.commit(batch).await;
        timer.record();
        result?;

        info!(
            invitation_id = %id,
            group_id = %invitation.group_id,
            status = %status,
            "Invitation answered"
        );
        invitation.status = status;
        Ok(invitation)
    }

    /// Pending, unexpired invitations addressed to the email.
    pub async fn pending_for(&self, email: &str) -> Result<Vec<Invitation>, SyncError> {
        let timer = QueryTimer::new("pending_invitations");
        let result = self.store.query(&pending_query(email)).await;
        timer.record();

        let now = Utc::now();
        Ok(result?
            .iter()
            .filter_map(parse_invitation)
            .filter(|inv| inv.is_pending() && !inv.is_expired(now))
            .collect())
    }
}

/// Query for an invitee's pending invitations.
pub fn pending_query(email: &str) -> Query {
    Query::collection(INVITATIONS)
        .where_eq("inviteeEmail", email)
        .where_eq("status", InvitationStatus::Pending.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use domain::schema::RawGroup;
    use std::sync::Arc;

    fn setup() -> (MemoryStore, InvitationRepository) {
        let store = MemoryStore::new();
        store.seed(USERS, "u1", json!({"email": "ana@x.com", "name": "Ana"}));
        store.seed(USERS, "u2", json!({"email": "beto@x.com", "name": "Beto"}));
        store.seed(
            GROUPS,
            "g1",
            json!({"name": "Familia", "createdBy": "ana@x.com", "members": ["ana@x.com"]}),
        );
        (store.clone(), InvitationRepository::new(Arc::new(store)))
    }

    fn request(invitee: &str) -> NewInvitation {
        NewInvitation {
            group_id: "g1".into(),
            invitee_email: invitee.into(),
            inviter_email: "ana@x.com".into(),
            inviter_name: "Ana".into(),
        }
    }

    #[tokio::test]
    async fn test_invite_adds_pending_entry() {
        let (store, invitations) = setup();
        let inv = invitations.invite(request("beto@x.com")).await.unwrap();
        assert_eq!(inv.group_name, "Familia");
        assert!(inv.expires_at.unwrap() > inv.created_at.unwrap());

        let group = RawGroup::classify(&store.peek(GROUPS, "g1").unwrap());
        assert_eq!(group.header.pending_invitations, vec!["beto@x.com"]);
        assert_eq!(invitations.pending_for("beto@x.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invite_writes_nothing_when_group_write_fails() {
        let store = MemoryStore::new().with_read_only(GROUPS);
        store.seed(USERS, "u2", json!({"email": "beto@x.com", "name": "Beto"}));
        store.seed(GROUPS, "g1", json!({"name": "Familia", "members": ["ana@x.com"]}));
        let invitations = InvitationRepository::new(Arc::new(store.clone()));

        let err = invitations.invite(request("beto@x.com")).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert_eq!(store.count(INVITATIONS), 0);
        let group = RawGroup::classify(&store.peek(GROUPS, "g1").unwrap());
        assert!(group.header.pending_invitations.is_empty());
    }

    #[tokio::test]
    async fn test_invite_rejects_members_and_strangers() {
        let (_, invitations) = setup();
        let err = invitations.invite(request("ana@x.com")).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        let err = invitations.invite(request("zed@x.com")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reject_removes_pending_entry() {
        let (store, invitations) = setup();
        let inv = invitations.invite(request("beto@x.com")).await.unwrap();
        let answered = invitations
            .respond(&inv.id, InvitationResponse::Reject)
            .await
            .unwrap();
        assert_eq!(answered.status, InvitationStatus::Rejected);

        let group = RawGroup::classify(&store.peek(GROUPS, "g1").unwrap());
        assert!(group.header.pending_invitations.is_empty());
        assert!(!group.is_member("beto@x.com", None));

        let err = invitations
            .respond(&inv.id, InvitationResponse::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_expired_invitation_cannot_be_accepted() {
        let (store, invitations) = setup();
        store.seed(
            INVITATIONS,
            "old",
            json!({
                "groupId": "g1",
                "inviteeEmail": "beto@x.com",
                "status": "pending",
                "expiresAt": {"seconds": 1}
            }),
        );
        let err = invitations
            .respond("old", InvitationResponse::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        assert!(invitations.pending_for("beto@x.com").await.unwrap().is_empty());
    }
}
