//! Live alert views.
//!
//! Each group is followed through the link-field chain: an ordered watch
//! that fails is reopened unordered, a watch whose first snapshot is empty
//! hands over to the next link field, and the first watch that delivers
//! documents is kept. When every link field comes up empty the group's
//! slice is published empty and the first healthy watch stays open so
//! later alerts still arrive.

use domain::models::{Alert, AlertSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::aggregator::{spawn_merge, SourceSender, SourceUpdate};
use super::LiveView;
use crate::collections::{CIRCLE_ALERTS, SMARTWATCH_ALERTS};
use crate::fallback::{FallbackPlan, Outcome, Step};
use crate::metrics::{record_fallback_attempt, record_fallback_exhausted};
use crate::repositories::alert::normalize_all;
use crate::store::{Query, SharedStore, Watch, WatchTarget};

/// Circle alerts of one group.
///
/// Must be called inside a tokio runtime.
pub fn watch_group_alerts(store: &SharedStore, group_id: &str) -> LiveView<Alert> {
    let (view, publisher) = LiveView::channel("group_alerts");
    let sources = spawn_merge(publisher.clone());
    spawn_group(store, group_id, &sources, publisher.token().child_token());
    view
}

/// Circle alerts of every given group plus every wearable alert.
pub fn watch_user_alerts(store: &SharedStore, group_ids: &[String]) -> LiveView<Alert> {
    let (view, publisher) = LiveView::channel("user_alerts");
    let sources = spawn_merge(publisher.clone());
    for group_id in group_ids {
        spawn_group(store, group_id, &sources, publisher.token().child_token());
    }

    let store = store.clone();
    let tx = sources.clone();
    let token = publisher.token().child_token();
    tokio::spawn(async move { follow_smartwatch(store, tx, token).await });

    info!(groups = group_ids.len(), "User alert view opened");
    view
}

fn spawn_group(
    store: &SharedStore,
    group_id: &str,
    sources: &SourceSender<Alert>,
    token: CancellationToken,
) {
    let store = store.clone();
    let group_id = group_id.to_string();
    let tx = sources.clone();
    tokio::spawn(async move { follow_group(store, group_id, tx, token).await });
}

/// How following a single watch ended.
enum Ended {
    Cancelled,
    Failed,
}

async fn follow_group(
    store: SharedStore,
    group_id: String,
    tx: SourceSender<Alert>,
    token: CancellationToken,
) {
    let plan = FallbackPlan::group_links("live_group_alerts", CIRCLE_ALERTS, &group_id);
    let source = format!("circle:{}", group_id);
    let publish = |docs: &[shared::Document]| {
        let alerts = normalize_all(docs, AlertSource::Circle, Some(group_id.as_str()));
        tx.send(SourceUpdate {
            source: source.clone(),
            items: alerts,
        })
        .is_ok()
    };

    let mut step = plan.first();
    let mut parked: Option<(Step, Watch)> = None;

    loop {
        let Some(query) = plan.query_for(step) else {
            record_fallback_exhausted(plan.name);
            debug!(group_id = %group_id, "Every link field is empty");
            if !publish(&[]) {
                return;
            }
            match parked.take() {
                Some((parked_step, mut watch)) => {
                    match follow(&mut watch, &token, &publish).await {
                        Ended::Cancelled => return,
                        Ended::Failed => {
                            step = plan.advance(parked_step, Outcome::Failed);
                            continue;
                        }
                    }
                }
                None => {
                    token.cancelled().await;
                    return;
                }
            }
        };

        if token.is_cancelled() {
            return;
        }
        let mut watch = match store.watch(WatchTarget::Query(query.clone())).await {
            Ok(watch) => watch,
            Err(e) => {
                warn!(query = %query.describe(), error = %e, "Failed to open alert watch");
                record_fallback_attempt(plan.name, Outcome::Failed.label());
                step = plan.advance(step, Outcome::Failed);
                continue;
            }
        };

        let first = tokio::select! {
            _ = token.cancelled() => return,
            snapshot = watch.next() => snapshot,
        };
        match first {
            Some(Ok(docs)) if !docs.is_empty() => {
                record_fallback_attempt(plan.name, Outcome::Found.label());
                debug!(group_id = %group_id, query = %query.describe(), "Following alert watch");
                parked = None;
                if !publish(&docs) {
                    return;
                }
                match follow(&mut watch, &token, &publish).await {
                    Ended::Cancelled => return,
                    Ended::Failed => {
                        warn!(group_id = %group_id, query = %query.describe(), "Alert watch failed, demoting");
                        step = plan.advance(step, Outcome::Failed);
                    }
                }
            }
            Some(Ok(_)) => {
                record_fallback_attempt(plan.name, Outcome::Empty.label());
                let next = plan.advance(step, Outcome::Empty);
                if parked.is_none() {
                    parked = Some((step, watch));
                }
                step = next;
            }
            Some(Err(e)) => {
                debug!(query = %query.describe(), error = %e, "Alert watch rejected");
                record_fallback_attempt(plan.name, Outcome::Failed.label());
                step = plan.advance(step, Outcome::Failed);
            }
            None => {
                record_fallback_attempt(plan.name, Outcome::Failed.label());
                step = plan.advance(step, Outcome::Failed);
            }
        }
    }
}

/// Publishes every snapshot of `watch` until it fails or the view closes.
async fn follow<F>(watch: &mut Watch, token: &CancellationToken, publish: &F) -> Ended
where
    F: Fn(&[shared::Document]) -> bool,
{
    loop {
        let snapshot = tokio::select! {
            _ = token.cancelled() => return Ended::Cancelled,
            snapshot = watch.next() => snapshot,
        };
        match snapshot {
            Some(Ok(docs)) => {
                if !publish(&docs) {
                    return Ended::Cancelled;
                }
            }
            Some(Err(_)) | None => return Ended::Failed,
        }
    }
}

async fn follow_smartwatch(store: SharedStore, tx: SourceSender<Alert>, token: CancellationToken) {
    let publish = |docs: &[shared::Document]| {
        tx.send(SourceUpdate {
            source: "smartwatch".to_string(),
            items: normalize_all(docs, AlertSource::Smartwatch, None),
        })
        .is_ok()
    };

    let target = WatchTarget::Query(Query::collection(SMARTWATCH_ALERTS));
    let ended = match store.watch(target).await {
        Ok(mut watch) => follow(&mut watch, &token, &publish).await,
        Err(e) => {
            warn!(error = %e, "Failed to open smartwatch alert watch");
            Ended::Failed
        }
    };
    if let Ended::Failed = ended {
        warn!("Smartwatch alert watch stopped");
        publish(&[]);
        token.cancelled().await;
    }
}
