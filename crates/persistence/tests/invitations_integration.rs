//! Integration tests for the invitation lifecycle.

mod common;

use common::{seed_user, seed_web_group, test_context, TestUser};
use domain::models::invitation::{InvitationResponse, NewInvitation};
use domain::models::InvitationStatus;
use persistence::collections::{GROUPS, USERS};
use persistence::{CirclesContext, SyncError};
use serde_json::json;

fn request(group_id: &str, inviter: &TestUser, invitee: &TestUser) -> NewInvitation {
    NewInvitation {
        group_id: group_id.to_string(),
        invitee_email: invitee.email.clone(),
        inviter_email: inviter.email.clone(),
        inviter_name: inviter.name.clone(),
    }
}

async fn members(ctx: &CirclesContext, group_id: &str) -> (Vec<String>, Vec<String>) {
    let group = ctx.groups().get_group(group_id).await.unwrap();
    let mobile = group
        .miembros
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.email)
        .collect();
    (group.members, mobile)
}

#[tokio::test]
async fn test_accept_adds_member_to_both_shapes() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[]);

    let invitation = ctx
        .invitations()
        .invite(request(&group_id, &ana, &beto))
        .await
        .unwrap();
    let group = ctx.groups().get_group(&group_id).await.unwrap();
    assert_eq!(group.pending_invitations, vec![beto.email.clone()]);

    let answered = ctx
        .invitations()
        .respond(&invitation.id, InvitationResponse::Accept)
        .await
        .unwrap();
    assert_eq!(answered.status, InvitationStatus::Accepted);

    let group = ctx.groups().get_group(&group_id).await.unwrap();
    assert!(group.pending_invitations.is_empty());
    let (web, mobile) = members(&ctx, &group_id).await;
    assert!(web.contains(&beto.email));
    assert!(mobile.contains(&beto.email));

    let user = store.peek(USERS, &beto.id).unwrap();
    assert_eq!(user.get("currentGroupId"), Some(&json!(group_id)));
    assert!(ctx.invitations().pending_for(&beto.email).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reject_leaves_membership_untouched() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[]);
    let invitation = ctx
        .invitations()
        .invite(request(&group_id, &ana, &beto))
        .await
        .unwrap();

    ctx.invitations()
        .respond(&invitation.id, InvitationResponse::Reject)
        .await
        .unwrap();

    let group = ctx.groups().get_group(&group_id).await.unwrap();
    assert_eq!(group.members, vec![ana.email.clone()]);
    assert!(group.pending_invitations.is_empty());
}

#[tokio::test]
async fn test_answered_invitation_cannot_be_answered_again() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[]);
    let invitation = ctx
        .invitations()
        .invite(request(&group_id, &ana, &beto))
        .await
        .unwrap();
    ctx.invitations()
        .respond(&invitation.id, InvitationResponse::Reject)
        .await
        .unwrap();

    let err = ctx
        .invitations()
        .respond(&invitation.id, InvitationResponse::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
}

#[tokio::test]
async fn test_invite_requires_registered_non_member() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[&beto]);

    let stranger = TestUser::new();
    let err = ctx
        .invitations()
        .invite(request(&group_id, &ana, &stranger))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));

    let err = ctx
        .invitations()
        .invite(request(&group_id, &ana, &beto))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));

    let group = store.peek(GROUPS, &group_id).unwrap();
    assert_eq!(group.get("pendingInvitations"), Some(&json!([])));
}
