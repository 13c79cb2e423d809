//! Integration tests for dual-shape group membership and the backfill sweep.

mod common;

use common::{seed_mobile_group, seed_user, seed_web_group, test_context};
use domain::models::group::NewGroup;
use persistence::collections::GROUPS;
use persistence::SyncError;
use serde_json::json;
use tokio_test::assert_ok;

fn str_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn mobile_emails(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("email").and_then(|e| e.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Creation and membership
// ============================================================================

#[tokio::test]
async fn test_created_group_carries_both_shapes() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);

    let group = ctx
        .groups()
        .create_group(NewGroup {
            name: "Familia".into(),
            description: String::new(),
            created_by: ana.email.clone(),
            members: vec![beto.email.clone()],
        })
        .await
        .unwrap();

    let doc = store.peek(GROUPS, &group.id).unwrap();
    assert_eq!(str_list(doc.get("members")), vec![ana.email.clone(), beto.email.clone()]);
    assert_eq!(mobile_emails(doc.get("miembros")), vec![ana.email.clone(), beto.email.clone()]);
    assert_eq!(doc.get("tipo"), Some(&json!("familia")));

    let health = ctx.groups().sync_health(&ana.email).await.unwrap();
    assert_eq!(health.health_percentage, 100);
}

#[tokio::test]
async fn test_mobile_only_member_sees_group() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_mobile_group(&store, &ana, &[&beto]);

    let groups = ctx.groups().user_groups(&beto.email).await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, group_id);
    assert!(groups[0].has_member(&beto.email));
    assert_eq!(groups[0].name, "Casa");
}

#[tokio::test]
async fn test_upsert_member_writes_every_shape_once() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[]);

    assert!(ctx.groups().upsert_member(&group_id, &beto.email).await.unwrap());
    assert!(!ctx.groups().upsert_member(&group_id, &beto.email).await.unwrap());

    let doc = store.peek(GROUPS, &group_id).unwrap();
    assert_eq!(str_list(doc.get("members")), vec![ana.email.clone(), beto.email.clone()]);
    assert_eq!(mobile_emails(doc.get("miembros")), vec![ana.email.clone(), beto.email.clone()]);
    assert_eq!(str_list(doc.get("membersUids")), vec![ana.id.clone(), beto.id.clone()]);
}

#[tokio::test]
async fn test_unregistered_member_is_rejected() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[]);

    let err = ctx
        .groups()
        .upsert_member(&group_id, "nadie@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_only_creator_deletes_group() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[&beto]);

    let err = ctx.groups().delete_group(&group_id, &beto.email).await.unwrap_err();
    assert!(matches!(err, SyncError::Forbidden(_)));

    assert_ok!(ctx.groups().delete_group(&group_id, &ana.email).await);
    assert!(store.peek(GROUPS, &group_id).is_none());
}

// ============================================================================
// Backfill sweep
// ============================================================================

#[tokio::test]
async fn test_backfill_converges_in_one_run() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let web_id = seed_web_group(&store, &ana, &[&beto]);
    let mobile_id = seed_mobile_group(&store, &beto, &[&ana]);
    seed_web_group(&store, &beto, &[]);

    let health = ctx.groups().sync_health(&ana.email).await.unwrap();
    assert_eq!(health.total_groups, 2);
    assert_eq!(health.synced_groups, 0);

    let first = assert_ok!(ctx.groups().backfill_all().await);
    assert_eq!(first.processed, 3);
    assert_eq!(first.updated, 3);
    assert_eq!(first.errors, 0);

    let web = store.peek(GROUPS, &web_id).unwrap();
    assert_eq!(mobile_emails(web.get("miembros")), vec![ana.email.clone(), beto.email.clone()]);
    let mobile = store.peek(GROUPS, &mobile_id).unwrap();
    assert_eq!(str_list(mobile.get("members")), vec![beto.email.clone(), ana.email.clone()]);

    let second = ctx.groups().backfill_all().await.unwrap();
    assert_eq!(second.processed, 3);
    assert_eq!(second.updated, 0);

    let health = ctx.groups().sync_health(&ana.email).await.unwrap();
    assert_eq!(health.health_percentage, 100);
    assert!(health.needs_update.is_empty());
}
