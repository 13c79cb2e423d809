//! Alert reads and resolution across the circle, smartwatch and legacy
//! collections.

use chrono::{DateTime, Utc};
use domain::models::alert::{AlertRef, NewAlert, ResolveReport};
use domain::models::{Alert, AlertSource, AlertStats};
use domain::schema::normalize_alert_document;
use domain::services::{alert_stats, merge_newest_first};
use serde_json::{json, Value};
use shared::time::store_now;
use shared::{Document, Fields};
use tracing::{info, warn};
use validator::Validate;

use crate::collections::{CIRCLE_ALERTS, LEGACY_ALERTS, SMARTWATCH_ALERTS};
use crate::error::SyncError;
use crate::fallback::{resolve, FallbackPlan};
use crate::metrics::QueryTimer;
use crate::store::{FieldUpdates, Query, SharedStore};

/// Repository for alert documents.
#[derive(Clone)]
pub struct AlertRepository {
    store: SharedStore,
}

impl AlertRepository {
    /// Creates a new AlertRepository with the given store handle.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Every circle alert linked to the group by any historical link field,
    /// de-duplicated and newest first. Never fails; unreachable shapes
    /// contribute nothing.
    pub async fn group_alerts(&self, group_id: &str) -> Vec<Alert> {
        let plan = FallbackPlan::group_links("group_alerts", CIRCLE_ALERTS, group_id).union();
        let timer = QueryTimer::new("group_alerts");
        let resolution = resolve(self.store.as_ref(), &plan).await;
        timer.record();
        normalize_all(&resolution.documents, AlertSource::Circle, Some(group_id))
    }

    /// Latest circle alerts from the newest link field that has any.
    ///
    /// Unordered fallback attempts return the whole link field; the result is
    /// sorted here before it is cut to `limit`.
    pub async fn recent_group_alerts(&self, group_id: &str, limit: usize) -> Vec<Alert> {
        let plan =
            FallbackPlan::group_links("recent_group_alerts", CIRCLE_ALERTS, group_id).with_limit(limit);
        let resolution = resolve(self.store.as_ref(), &plan).await;
        let mut alerts = normalize_all(&resolution.documents, AlertSource::Circle, Some(group_id));
        alerts.truncate(limit);
        alerts
    }

    /// Every wearable alert, newest first.
    pub async fn smartwatch_alerts(&self) -> Result<Vec<Alert>, SyncError> {
        let timer = QueryTimer::new("smartwatch_alerts");
        let result = self.store.query(&Query::collection(SMARTWATCH_ALERTS)).await;
        timer.record();
        Ok(normalize_all(&result?, AlertSource::Smartwatch, None))
    }

    /// Circle alerts of every given group plus all wearable alerts.
    ///
    /// A failing wearable read is logged and contributes nothing.
    pub async fn alerts_for_groups(&self, group_ids: &[String]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for group_id in group_ids {
            alerts.extend(self.group_alerts(group_id).await);
        }
        match self.smartwatch_alerts().await {
            Ok(wearable) => alerts.extend(wearable),
            Err(e) => warn!(error = %e, "Failed to read smartwatch alerts"),
        }
        merge_newest_first(alerts)
    }

    /// Marks an alert resolved. The record is kept.
    pub async fn resolve(&self, id: &str, source: AlertSource) -> Result<(), SyncError> {
        let collection = match source {
            AlertSource::Circle => CIRCLE_ALERTS,
            AlertSource::Smartwatch => SMARTWATCH_ALERTS,
        };
        if self.store.get(collection, id).await?.is_none() {
            return Err(SyncError::not_found("Alert", id));
        }

        let now = store_now();
        let updates = match source {
            AlertSource::Circle => FieldUpdates::new()
                .set("activatrue", false)
                .set("resolved", true)
                .set("resolvedAt", now),
            AlertSource::Smartwatch => FieldUpdates::new()
                .set("resolved", true)
                .set("resolvedAt", now),
        };

        let timer = QueryTimer::new("resolve_alert");
        let result = self.store.update(collection, id, updates).await;
        timer.record();
        result?;

        info!(alert_id = %id, source = %source, "Alert resolved");
        Ok(())
    }

    /// Resolves each alert independently; failures are collected.
    pub async fn resolve_many(&self, alerts: &[AlertRef]) -> ResolveReport {
        let mut report = ResolveReport::default();
        for alert in alerts {
            match self.resolve(&alert.id, alert.source).await {
                Ok(()) => report.resolved += 1,
                Err(e) => {
                    warn!(alert_id = %alert.id, error = %e, "Failed to resolve alert");
                    report.failed.push(alert.id.clone());
                }
            }
        }
        report
    }

    /// Dashboard counters for a group.
    pub async fn group_stats(&self, group_id: &str, now: DateTime<Utc>) -> AlertStats {
        alert_stats(&self.group_alerts(group_id).await, now)
    }

    /// Writes an alert into the first-generation `alerts` collection.
    pub async fn create_legacy_alert(&self, alert: NewAlert) -> Result<String, SyncError> {
        alert.validate()?;

        let mut fields = Fields::new();
        fields.insert("userId".into(), json!(alert.user_id));
        fields.insert("userEmail".into(), json!(alert.user_email));
        fields.insert("userName".into(), json!(alert.user_name));
        fields.insert("location".into(), json!(alert.location));
        if let Some(coords) = alert.coordinates {
            fields.insert("coordinates".into(), json!({"lat": coords.lat, "lng": coords.lng}));
        }
        fields.insert("type".into(), json!(alert.kind.as_str()));
        if let Some(group_id) = &alert.group_id {
            fields.insert("groupId".into(), json!(group_id));
        }
        if let Some(message) = &alert.message {
            fields.insert("message".into(), json!(message));
        }
        if let Some(phone) = &alert.phone {
            fields.insert("phone".into(), json!(phone));
        }
        fields.insert("timestamp".into(), store_now());
        fields.insert("resolved".into(), Value::Bool(false));

        let timer = QueryTimer::new("create_legacy_alert");
        let result = self.store.add(LEGACY_ALERTS, fields).await;
        timer.record();
        let id = result?;

        info!(alert_id = %id, user_id = %alert.user_id, kind = %alert.kind, "Legacy alert created");
        Ok(id)
    }

    /// Every alert of the legacy collection, newest first.
    pub async fn legacy_alerts(&self) -> Result<Vec<Alert>, SyncError> {
        let timer = QueryTimer::new("legacy_alerts");
        let result = self.store.query(&Query::collection(LEGACY_ALERTS)).await;
        timer.record();
        Ok(normalize_all(&result?, AlertSource::Circle, None))
    }
}

/// Normalizes, drops malformed documents, de-duplicates and sorts.
pub fn normalize_all(
    documents: &[Document],
    source: AlertSource,
    fallback_group: Option<&str>,
) -> Vec<Alert> {
    merge_newest_first(
        documents
            .iter()
            .filter_map(|doc| normalize_alert_document(doc, source, fallback_group)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use domain::models::AlertKind;
    use std::sync::Arc;

    fn repo(store: &MemoryStore) -> AlertRepository {
        AlertRepository::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_resolve_circle_alert() {
        let store = MemoryStore::new();
        store.seed(CIRCLE_ALERTS, "a1", json!({"timestamp": 1, "activatrue": true}));
        repo(&store).resolve("a1", AlertSource::Circle).await.unwrap();

        let doc = store.peek(CIRCLE_ALERTS, "a1").unwrap();
        assert_eq!(doc.fields["activatrue"], json!(false));
        assert_eq!(doc.fields["resolved"], json!(true));
        assert!(doc.has("resolvedAt"));
    }

    #[tokio::test]
    async fn test_resolve_smartwatch_alert() {
        let store = MemoryStore::new();
        store.seed(SMARTWATCH_ALERTS, "w1", json!({"timestamp": 1}));
        repo(&store).resolve("w1", AlertSource::Smartwatch).await.unwrap();

        let doc = store.peek(SMARTWATCH_ALERTS, "w1").unwrap();
        assert_eq!(doc.fields["resolved"], json!(true));
        assert!(!doc.has("activatrue"));
    }

    #[tokio::test]
    async fn test_resolve_missing_alert() {
        let store = MemoryStore::new();
        let err = repo(&store).resolve("nope", AlertSource::Circle).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_many_collects_failures() {
        let store = MemoryStore::new();
        store.seed(CIRCLE_ALERTS, "a1", json!({"timestamp": 1}));
        store.seed(SMARTWATCH_ALERTS, "w1", json!({"timestamp": 1}));
        let report = repo(&store)
            .resolve_many(&[
                AlertRef { id: "a1".into(), source: AlertSource::Circle },
                AlertRef { id: "gone".into(), source: AlertSource::Circle },
                AlertRef { id: "w1".into(), source: AlertSource::Smartwatch },
            ])
            .await;
        assert_eq!(report.resolved, 2);
        assert_eq!(report.failed, vec!["gone"]);
    }

    #[tokio::test]
    async fn test_group_alerts_drop_missing_timestamps() {
        let store = MemoryStore::new().with_missing_index(CIRCLE_ALERTS, "timestamp");
        store.seed(CIRCLE_ALERTS, "a1", json!({"circleId": "g1", "timestamp": 5}));
        store.seed(CIRCLE_ALERTS, "a2", json!({"circleId": "g1"}));

        let alerts = repo(&store).group_alerts("g1").await;
        let ids: Vec<_> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[tokio::test]
    async fn test_recent_group_alerts_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.seed(
                CIRCLE_ALERTS,
                &format!("a{}", i),
                json!({"circleIds": ["g1"], "timestamp": {"seconds": i}}),
            );
        }
        let alerts = repo(&store).recent_group_alerts("g1", 2).await;
        let ids: Vec<_> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a4", "a3"]);
        assert_eq!(store.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_group_alerts_limit_without_index() {
        let store = MemoryStore::new().with_missing_index(CIRCLE_ALERTS, "timestamp");
        for i in 0..5 {
            store.seed(
                CIRCLE_ALERTS,
                &format!("a{}", i),
                json!({"circleIds": ["g1"], "timestamp": {"seconds": i}}),
            );
        }
        let alerts = repo(&store).recent_group_alerts("g1", 2).await;
        let ids: Vec<_> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a4", "a3"]);
        // Ordered attempt failed, unordered attempt fetched without a limit.
        let queries = store.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].limit, Some(2));
        assert_eq!(queries[1].limit, None);
    }

    #[tokio::test]
    async fn test_alerts_for_groups_merges_sources() {
        let store = MemoryStore::new();
        store.seed(CIRCLE_ALERTS, "a1", json!({"circleIds": ["g1"], "timestamp": {"seconds": 10}}));
        store.seed(CIRCLE_ALERTS, "a2", json!({"circleIds": ["g1", "g2"], "timestamp": {"seconds": 30}}));
        store.seed(SMARTWATCH_ALERTS, "w1", json!({"createdAt": {"seconds": 20}}));

        let alerts = repo(&store)
            .alerts_for_groups(&["g1".into(), "g2".into()])
            .await;
        let ids: Vec<_> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "w1", "a1"]);
    }

    #[tokio::test]
    async fn test_legacy_alert_roundtrip() {
        let store = MemoryStore::new();
        let alerts = repo(&store);
        let id = alerts
            .create_legacy_alert(NewAlert {
                user_id: "u1".into(),
                user_email: "ana@x.com".into(),
                user_name: "Ana".into(),
                location: "Casa".into(),
                coordinates: None,
                kind: AlertKind::Manual,
                group_id: Some("g1".into()),
                message: Some("ayuda".into()),
                phone: None,
            })
            .await
            .unwrap();

        let listed = alerts.legacy_alerts().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].kind, AlertKind::Manual);
        assert!(!listed[0].resolved);
        assert_eq!(listed[0].group_id.as_deref(), Some("g1"));
    }

    #[tokio::test]
    async fn test_legacy_alert_validation() {
        let store = MemoryStore::new();
        let err = repo(&store)
            .create_legacy_alert(NewAlert {
                user_id: "".into(),
                user_email: "ana@x.com".into(),
                user_name: "Ana".into(),
                location: "Casa".into(),
                coordinates: None,
                kind: AlertKind::Panic,
                group_id: None,
                message: None,
                phone: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.count(LEGACY_ALERTS), 0);
    }
}
