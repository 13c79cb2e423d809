//! Integration tests for location reports, group reads and maintenance sweeps.

mod common;

use chrono::Duration;
use common::{seed_mobile_group, seed_user, seed_web_group, test_context, ts};
use domain::models::{LocationReport, PrecisionLevel};
use persistence::collections::LOCATIONS;
use persistence::SyncError;
use serde_json::json;

// ============================================================================
// Reports
// ============================================================================

#[tokio::test]
async fn test_imprecise_report_is_rejected_without_write() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);

    let err = ctx
        .locations()
        .report(&ana.email, LocationReport::new(19.43, -99.13, Some(60.0)))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("60"));
    assert_eq!(store.count(LOCATIONS), 0);
}

#[tokio::test]
async fn test_report_is_visible_to_group() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_web_group(&store, &ana, &[&beto]);

    let accepted = ctx
        .locations()
        .report(&beto.email, LocationReport::new(19.43, -99.13, Some(25.0)))
        .await
        .unwrap();
    assert_eq!(accepted.level, PrecisionLevel::Acceptable);
    assert!(!accepted.low_precision);

    let locations = ctx.locations().group_member_locations(&group_id).await.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].user_id, beto.id);
    assert!(locations[0].is_online);

    let doc = store.peek(LOCATIONS, &beto.id).unwrap();
    assert_eq!(doc.get("precision"), Some(&json!("aceptable")));
}

#[tokio::test]
async fn test_report_from_unknown_user_fails() {
    let (_store, ctx) = test_context();
    let err = ctx
        .locations()
        .report("nadie@example.com", LocationReport::new(19.43, -99.13, Some(5.0)))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_mobile_group_resolves_members_by_uid() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    let group_id = seed_mobile_group(&store, &ana, &[&beto]);
    store.seed(LOCATIONS, &ana.id, json!({"lat": 19.4, "lng": -99.1, "timestamp": ts(10)}));
    store.seed(LOCATIONS, &beto.id, json!({"lat": 19.5, "lng": -99.2, "timestamp": ts(20)}));

    let locations = ctx.locations().group_member_locations(&group_id).await.unwrap();

    let ids: Vec<&str> = locations.iter().map(|l| l.user_id.as_str()).collect();
    assert_eq!(ids, vec![beto.id.as_str(), ana.id.as_str()]);
}

// ============================================================================
// Sharing state
// ============================================================================

#[tokio::test]
async fn test_activate_and_deactivate_sharing() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);

    assert!(!ctx.locations().circle_status(&ana.email).await.active);

    ctx.locations().activate(&ana.email).await.unwrap();
    assert!(ctx.locations().circle_status(&ana.email).await.active);

    ctx.locations().deactivate(&ana.email).await.unwrap();
    assert!(!ctx.locations().circle_status(&ana.email).await.active);
    assert!(store.peek(LOCATIONS, &ana.id).is_some());
}

// ============================================================================
// Maintenance sweeps
// ============================================================================

#[tokio::test]
async fn test_orphaned_locations_are_removed() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    store.seed(LOCATIONS, &ana.id, json!({"lat": 19.4, "lng": -99.1}));
    store.seed(LOCATIONS, "ghost", json!({"lat": 19.4, "lng": -99.1}));

    let report = ctx.locations().cleanup_orphaned().await;

    assert_eq!(report.found, 1);
    assert_eq!(report.cleaned, 1);
    assert!(store.peek(LOCATIONS, "ghost").is_none());
    assert!(store.peek(LOCATIONS, &ana.id).is_some());
}

#[tokio::test]
async fn test_stale_locations_go_offline_once() {
    let (store, ctx) = test_context();
    let ana = seed_user(&store);
    let beto = seed_user(&store);
    store.seed(
        LOCATIONS,
        &ana.id,
        json!({"lat": 19.4, "lng": -99.1, "isOnline": true, "timestamp": ts(10)}),
    );
    ctx.locations()
        .report(&beto.email, LocationReport::new(19.43, -99.13, Some(5.0)))
        .await
        .unwrap();

    let first = ctx.locations().mark_inactive(Duration::minutes(30)).await;
    assert_eq!(first.cleaned, 1);
    assert_eq!(
        store.peek(LOCATIONS, &ana.id).unwrap().get("isOnline"),
        Some(&json!(false))
    );
    assert_eq!(
        store.peek(LOCATIONS, &beto.id).unwrap().get("isOnline"),
        Some(&json!(true))
    );

    let second = ctx.locations().mark_inactive(Duration::minutes(30)).await;
    assert_eq!(second.cleaned, 0);
}
