//! Live views of stored locations.
//!
//! Location documents carry no group link, so the group view watches the
//! whole locations collection together with the group document. Bursts of
//! changes are debounced before the member locations are fetched again.
//! A user's own location is a single document and is followed directly.

use domain::models::Location;
use domain::schema::normalize_location;
use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::LiveView;
use crate::collections::{GROUPS, LOCATIONS};
use crate::repositories::{LocationRepository, UserRepository};
use crate::store::{Query, SharedStore, Snapshot, WatchTarget};

/// Default quiet period before a refetch.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub fn watch_group_locations(
    locations: &LocationRepository,
    group_id: &str,
    debounce: Duration,
) -> LiveView<Location> {
    let (view, publisher) = LiveView::channel("group_locations");
    let repo = locations.clone();
    let group_id = group_id.to_string();

    tokio::spawn(async move {
        let token = publisher.token().clone();
        let store = repo.store().clone();
        let watches = tokio::try_join!(
            store.watch(WatchTarget::Query(Query::collection(LOCATIONS))),
            store.watch(WatchTarget::document(GROUPS, &group_id)),
        );
        let (mut location_watch, mut group_watch) = match watches {
            Ok(pair) => pair,
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "Failed to open location watches");
                publisher.publish(Vec::new());
                return;
            }
        };

        let mut deadline: Option<Instant> = None;
        loop {
            let due = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };
            let changed: Option<Snapshot> = tokio::select! {
                _ = token.cancelled() => return,
                snapshot = location_watch.next() => snapshot,
                snapshot = group_watch.next() => snapshot,
                _ = due => {
                    deadline = None;
                    let fetched = repo.group_member_locations(&group_id).await;
                    if token.is_cancelled() {
                        return;
                    }
                    let fresh = fetched.unwrap_or_else(|e| {
                        warn!(group_id = %group_id, error = %e, "Failed to fetch member locations");
                        Vec::new()
                    });
                    debug!(group_id = %group_id, count = fresh.len(), "Member locations refreshed");
                    if !publisher.publish(fresh) {
                        return;
                    }
                    continue;
                }
            };

            match changed {
                Some(Ok(_)) => deadline = Some(Instant::now() + debounce),
                Some(Err(e)) => {
                    warn!(group_id = %group_id, error = %e, "Location watch failed");
                    publisher.publish(Vec::new());
                    return;
                }
                None => {
                    publisher.publish(Vec::new());
                    return;
                }
            }
        }
    });

    view
}

/// The user's own location: one entry while a usable position is stored,
/// empty otherwise. Unknown users get a single empty update.
pub fn watch_my_location(store: &SharedStore, email: &str) -> LiveView<Location> {
    let (view, publisher) = LiveView::channel("my_location");
    let store = store.clone();
    let email = email.to_string();

    tokio::spawn(async move {
        let token = publisher.token().clone();
        let account = match UserRepository::new(store.clone()).find_by_email(&email).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                debug!(email = %email, "No account to follow");
                publisher.publish(Vec::new());
                return;
            }
            Err(e) => {
                warn!(email = %email, error = %e, "Account lookup failed");
                publisher.publish(Vec::new());
                return;
            }
        };

        let mut watch = match store.watch(WatchTarget::document(LOCATIONS, &account.id)).await {
            Ok(watch) => watch,
            Err(e) => {
                warn!(user_id = %account.id, error = %e, "Failed to open location watch");
                publisher.publish(Vec::new());
                return;
            }
        };

        loop {
            let snapshot = tokio::select! {
                _ = token.cancelled() => return,
                snapshot = watch.next() => snapshot,
            };
            let located = match snapshot {
                Some(Ok(docs)) => docs.iter().filter_map(normalize_location).collect(),
                Some(Err(e)) => {
                    warn!(user_id = %account.id, error = %e, "Location watch failed");
                    publisher.publish(Vec::new());
                    return;
                }
                None => {
                    publisher.publish(Vec::new());
                    return;
                }
            };
            if !publisher.publish(located) {
                return;
            }
        }
    });

    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::USERS;
    use crate::store::{MemoryStore, SharedStore};
    use domain::services::PrecisionPolicy;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::timeout;

    fn setup() -> (MemoryStore, LocationRepository) {
        let store = MemoryStore::new();
        store.seed(USERS, "u1", json!({"email": "ana@x.com", "name": "Ana"}));
        store.seed(GROUPS, "g1", json!({"members": ["ana@x.com"]}));
        let shared: SharedStore = Arc::new(store.clone());
        (store, LocationRepository::new(shared, PrecisionPolicy::default()))
    }

    #[tokio::test]
    async fn test_burst_collapses_into_one_fetch() {
        let (store, repo) = setup();
        let mut view = watch_group_locations(&repo, "g1", Duration::from_millis(40));

        let initial = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert!(initial.is_empty());

        for (i, lat) in [19.41, 19.43, 19.42].into_iter().enumerate() {
            store.seed(
                LOCATIONS,
                "u1",
                json!({"lat": lat, "lng": -99.1, "timestamp": {"seconds": 10 + i}}),
            );
        }
        let update = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert_eq!(update.len(), 1);
        assert_eq!(update[0].latitude, 19.42);

        let quiet = timeout(Duration::from_millis(200), view.next()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_my_location_follows_document() {
        let (store, repo) = setup();
        let shared = repo.store().clone();
        let mut view = watch_my_location(&shared, "ana@x.com");

        let initial = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert!(initial.is_empty());

        store.seed(
            LOCATIONS,
            "u1",
            json!({"lat": 19.4, "lng": -99.1, "userEmail": "ana@x.com", "isOnline": true}),
        );
        let located = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert_eq!(located.len(), 1);
        assert_eq!(located[0].user_id, "u1");
        assert_eq!(located[0].user_name, "ana");

        store.seed(LOCATIONS, "u1", json!({"lat": 0, "lng": 0}));
        let cleared = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert!(cleared.is_empty());
    }

    #[tokio::test]
    async fn test_my_location_unknown_user() {
        let (_, repo) = setup();
        let mut view = watch_my_location(repo.store(), "zed@x.com");
        let update = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert!(update.is_empty());
        assert!(timeout(Duration::from_secs(2), view.next()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_cancels_pending_fetch() {
        let (store, repo) = setup();
        let mut view = watch_group_locations(&repo, "g1", Duration::from_millis(40));
        timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();

        store.seed(LOCATIONS, "u1", json!({"lat": 19.4, "lng": -99.1}));
        view.close();
        assert!(view.next().await.is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.active_watchers(), 0);
    }
}
