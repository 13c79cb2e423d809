//! Live view of the groups a user belongs to.

use domain::models::UnifiedGroup;
use domain::schema::{merge, RawGroup};
use tracing::warn;

use super::LiveView;
use crate::collections::GROUPS;
use crate::repositories::UserRepository;
use crate::store::{Query, SharedStore, WatchTarget};

/// Every group containing `email` in either member shape. The whole groups
/// collection is watched because mobile membership cannot be filtered on.
pub fn watch_user_groups(store: &SharedStore, email: &str) -> LiveView<UnifiedGroup> {
    let (view, publisher) = LiveView::channel("user_groups");
    let store = store.clone();
    let email = email.to_string();

    tokio::spawn(async move {
        let token = publisher.token().clone();
        let uid = match UserRepository::new(store.clone()).find_by_email(&email).await {
            Ok(account) => account.map(|a| a.id),
            Err(e) => {
                warn!(email = %email, error = %e, "Account lookup failed, matching by email only");
                None
            }
        };

        let mut watch = match store.watch(WatchTarget::Query(Query::collection(GROUPS))).await {
            Ok(watch) => watch,
            Err(e) => {
                warn!(error = %e, "Failed to open group watch");
                publisher.publish(Vec::new());
                return;
            }
        };

        loop {
            let snapshot = tokio::select! {
                _ = token.cancelled() => return,
                snapshot = watch.next() => snapshot,
            };
            let groups = match snapshot {
                Some(Ok(docs)) => docs
                    .iter()
                    .map(RawGroup::classify)
                    .filter(|raw| raw.is_member(&email, uid.as_deref()))
                    .map(|raw| merge(&raw))
                    .collect(),
                Some(Err(e)) => {
                    warn!(error = %e, "Group watch failed");
                    publisher.publish(Vec::new());
                    return;
                }
                None => {
                    publisher.publish(Vec::new());
                    return;
                }
            };
            if !publisher.publish(groups) {
                return;
            }
        }
    });

    view
}
