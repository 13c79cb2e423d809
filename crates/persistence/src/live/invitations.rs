//! Live view of an invitee's pending invitations.

use chrono::Utc;
use domain::models::Invitation;
use domain::schema::parse_invitation;
use tracing::warn;

use super::LiveView;
use crate::repositories::invitation::pending_query;
use crate::store::{SharedStore, WatchTarget};

pub fn watch_pending_invitations(store: &SharedStore, email: &str) -> LiveView<Invitation> {
    let (view, publisher) = LiveView::channel("pending_invitations");
    let store = store.clone();
    let target = WatchTarget::Query(pending_query(email));

    tokio::spawn(async move {
        let token = publisher.token().clone();
        let mut watch = match store.watch(target).await {
            Ok(watch) => watch,
            Err(e) => {
                warn!(error = %e, "Failed to open invitation watch");
                publisher.publish(Vec::new());
                return;
            }
        };

        loop {
            let snapshot = tokio::select! {
                _ = token.cancelled() => return,
                snapshot = watch.next() => snapshot,
            };
            let Some(Ok(docs)) = snapshot else {
                warn!("Invitation watch stopped");
                publisher.publish(Vec::new());
                return;
            };
            let now = Utc::now();
            let pending = docs
                .iter()
                .filter_map(parse_invitation)
                .filter(|inv| inv.is_pending() && !inv.is_expired(now))
                .collect();
            if !publisher.publish(pending) {
                return;
            }
        }
    });

    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::INVITATIONS;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_pending_invitations_update() {
        let store = MemoryStore::new();
        store.seed(
            INVITATIONS,
            "i1",
            json!({"groupId": "g1", "inviteeEmail": "beto@x.com", "status": "pending"}),
        );
        let shared: SharedStore = Arc::new(store.clone());

        let mut view = watch_pending_invitations(&shared, "beto@x.com");
        let first = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.seed(
            INVITATIONS,
            "i1",
            json!({"groupId": "g1", "inviteeEmail": "beto@x.com", "status": "accepted"}),
        );
        let second = timeout(Duration::from_secs(2), view.next()).await.unwrap().unwrap();
        assert!(second.is_empty());
    }
}
