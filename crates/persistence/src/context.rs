//! One handle over every repository and live view.

use domain::models::{Alert, Invitation, Location, UnifiedGroup};
use domain::services::PrecisionPolicy;
use std::time::{Duration, Instant};

use crate::error::SyncError;
use crate::live::{self, LiveView};
use crate::repositories::{
    AlertRepository, GroupRepository, InvitationRepository, LocationRepository, UserRepository,
};
use crate::store::{SharedStore, StoreError};

/// Repositories built over one store handle.
#[derive(Clone)]
pub struct CirclesContext {
    store: SharedStore,
    users: UserRepository,
    alerts: AlertRepository,
    groups: GroupRepository,
    invitations: InvitationRepository,
    locations: LocationRepository,
    debounce: Duration,
}

impl CirclesContext {
    pub fn new(store: SharedStore, policy: PrecisionPolicy) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            alerts: AlertRepository::new(store.clone()),
            groups: GroupRepository::new(store.clone()),
            invitations: InvitationRepository::new(store.clone()),
            locations: LocationRepository::new(store.clone(), policy),
            debounce: live::locations::DEFAULT_DEBOUNCE,
            store,
        }
    }

    /// Quiet period applied to collection-wide location watches.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn alerts(&self) -> &AlertRepository {
        &self.alerts
    }

    pub fn groups(&self) -> &GroupRepository {
        &self.groups
    }

    pub fn invitations(&self) -> &InvitationRepository {
        &self.invitations
    }

    pub fn locations(&self) -> &LocationRepository {
        &self.locations
    }

    async fn group_ids(&self, email: &str) -> Result<Vec<String>, SyncError> {
        Ok(self
            .groups
            .user_raw_groups(email)
            .await?
            .into_iter()
            .map(|raw| raw.id)
            .collect())
    }

    /// Circle alerts of every group of the user plus all wearable alerts.
    pub async fn user_alerts(&self, email: &str) -> Result<Vec<Alert>, SyncError> {
        let group_ids = self.group_ids(email).await?;
        Ok(self.alerts.alerts_for_groups(&group_ids).await)
    }

    /// Live form of [`user_alerts`](Self::user_alerts). Group membership is
    /// read once when the view opens.
    pub async fn watch_user_alerts(&self, email: &str) -> Result<LiveView<Alert>, SyncError> {
        let group_ids = self.group_ids(email).await?;
        Ok(live::watch_user_alerts(&self.store, &group_ids))
    }

    pub fn watch_group_alerts(&self, group_id: &str) -> LiveView<Alert> {
        live::watch_group_alerts(&self.store, group_id)
    }

    pub fn watch_group_locations(&self, group_id: &str) -> LiveView<Location> {
        live::watch_group_locations(&self.locations, group_id, self.debounce)
    }

    pub fn watch_my_location(&self, email: &str) -> LiveView<Location> {
        live::watch_my_location(&self.store, email)
    }

    pub fn watch_user_groups(&self, email: &str) -> LiveView<UnifiedGroup> {
        live::watch_user_groups(&self.store, email)
    }

    pub fn watch_pending_invitations(&self, email: &str) -> LiveView<Invitation> {
        live::watch_pending_invitations(&self.store, email)
    }

    /// Round trip to the store.
    pub async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        self.store.ping().await?;
        Ok(start.elapsed())
    }
}
