//! Periodic location sweeps.

use chrono::Duration;
use persistence::repositories::{LocationRepository, UserRepository};
use tracing::info;

use super::scheduler::{Job, JobFrequency};

/// Merges duplicate accounts, deletes orphaned locations, then flags stale
/// ones offline.
pub struct LocationMaintenanceJob {
    users: UserRepository,
    locations: LocationRepository,
    inactive_after: Duration,
    interval_minutes: u64,
}

impl LocationMaintenanceJob {
    pub fn new(
        users: UserRepository,
        locations: LocationRepository,
        inactive_after: Duration,
        interval_minutes: u64,
    ) -> Self {
        Self {
            users,
            locations,
            inactive_after,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for LocationMaintenanceJob {
    fn name(&self) -> &'static str {
        "location_maintenance"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        // Merging duplicates first moves their locations before the orphan sweep.
        let duplicates = self.users.cleanup_duplicates().await;
        let orphans = self.locations.cleanup_orphaned().await;
        let inactive = self.locations.mark_inactive(self.inactive_after).await;

        info!(
            duplicates_cleaned = duplicates.cleaned,
            orphans_found = orphans.found,
            orphans_cleaned = orphans.cleaned,
            marked_offline = inactive.cleaned,
            "Location maintenance finished"
        );

        let errors = duplicates.errors.len() + orphans.errors.len() + inactive.errors;
        if errors > 0 {
            return Err(format!("{} location sweep errors", errors));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::PrecisionPolicy;
    use persistence::collections::{LOCATIONS, USERS};
    use persistence::{MemoryStore, SharedStore};
    use serde_json::json;
    use std::sync::Arc;

    fn job(store: &MemoryStore) -> LocationMaintenanceJob {
        let shared: SharedStore = Arc::new(store.clone());
        LocationMaintenanceJob::new(
            UserRepository::new(shared.clone()),
            LocationRepository::new(shared, PrecisionPolicy::default()),
            Duration::minutes(30),
            15,
        )
    }

    #[tokio::test]
    async fn test_execute_runs_both_sweeps() {
        let store = MemoryStore::new();
        store.seed(USERS, "u1", json!({"email": "ana@x.com"}));
        store.seed(
            LOCATIONS,
            "u1",
            json!({"lat": 19.4, "lng": -99.1, "isOnline": true, "timestamp": {"seconds": 1}}),
        );
        store.seed(LOCATIONS, "ghost", json!({"lat": 19.4, "lng": -99.1}));

        job(&store).execute().await.unwrap();

        assert!(store.peek(LOCATIONS, "ghost").is_none());
        assert_eq!(
            store.peek(LOCATIONS, "u1").unwrap().get("isOnline"),
            Some(&json!(false))
        );
    }

    #[tokio::test]
    async fn test_execute_merges_duplicate_accounts() {
        let store = MemoryStore::new();
        store.seed(USERS, "a", json!({"email": "ana@x.com", "createdAt": {"seconds": 5}}));
        store.seed(USERS, "b", json!({"email": "ana@x.com"}));
        store.seed(LOCATIONS, "b", json!({"lat": 19.4, "lng": -99.1}));

        job(&store).execute().await.unwrap();

        assert_eq!(store.count(USERS), 1);
        assert!(store.peek(LOCATIONS, "b").is_none());
        assert_eq!(
            store.peek(LOCATIONS, "a").unwrap().get("migratedFrom"),
            Some(&json!("b"))
        );
    }

    #[tokio::test]
    async fn test_sweep_errors_fail_run() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(job(&store).execute().await.is_err());
    }
}
