//! Latest-location documents, one per user.

use chrono::{Duration, Utc};
use domain::models::location::{
    AcceptedReport, AutoFixReport, CircleStatus, InactiveSweepReport, LocationDiagnosis,
    OrphanSweepReport,
};
use domain::models::user::{fallback_name, PresenceStatus};
use domain::models::{Location, LocationReport};
use domain::schema::{normalize_location, parse_account};
use domain::services::{merge_newest_first, PrecisionPolicy};
use serde_json::json;
use shared::time::{parse_instant, store_now};
use shared::Fields;
use std::collections::HashSet;
use tracing::{info, warn};
use validator::Validate;

use crate::collections::{LOCATIONS, USERS};
use crate::error::SyncError;
use crate::metrics::{record_sweep, QueryTimer};
use crate::repositories::user::accounts_by_email;
use crate::repositories::{GroupRepository, UserRepository};
use crate::store::{FieldUpdates, Query, SharedStore, WriteBatch};

/// Repository for location documents.
#[derive(Clone)]
pub struct LocationRepository {
    store: SharedStore,
    users: UserRepository,
    groups: GroupRepository,
    policy: PrecisionPolicy,
}

impl LocationRepository {
    /// Creates a new LocationRepository with the given store handle and
    /// precision thresholds.
    pub fn new(store: SharedStore, policy: PrecisionPolicy) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            groups: GroupRepository::new(store.clone()),
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &PrecisionPolicy {
        &self.policy
    }

    pub(crate) fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Stores a location report after the validity and precision gates.
    ///
    /// Rejected reports never reach the store.
    pub async fn report(
        &self,
        email: &str,
        report: LocationReport,
    ) -> Result<AcceptedReport, SyncError> {
        report.validate()?;
        let check = match self.policy.check(report.accuracy) {
            Ok(check) => check,
            Err(e) => {
                warn!(email = %email, accuracy = ?report.accuracy, error = %e, "Location report rejected");
                return Err(e.into());
            }
        };

        let account = self.users.require_by_email(email).await?;

        let mut fields = Fields::new();
        fields.insert("userId".into(), json!(account.id));
        fields.insert("userEmail".into(), json!(account.email));
        fields.insert("userName".into(), json!(account.name));
        fields.insert("lat".into(), json!(report.latitude));
        fields.insert("lng".into(), json!(report.longitude));
        fields.insert("accuracy".into(), json!(check.accuracy));
        fields.insert("precision".into(), json!(check.level.stored_label()));
        fields.insert("timestamp".into(), store_now());
        fields.insert("lastUpdate".into(), store_now());
        fields.insert("isOnline".into(), json!(true));

        let timer = QueryTimer::new("report_location");
        let result = self.store.set(LOCATIONS, &account.id, fields, true).await;
        timer.record();
        result?;

        if check.low_precision {
            warn!(user_id = %account.id, accuracy = check.accuracy, "Low precision location stored");
        }

        Ok(AcceptedReport {
            user_id: account.id,
            accuracy: check.accuracy,
            level: check.level,
            low_precision: check.low_precision,
        })
    }

    /// Locations of every member of the group, by either member shape.
    /// Members without an account or a valid location are skipped.
    pub async fn group_member_locations(&self, group_id: &str) -> Result<Vec<Location>, SyncError> {
        let raw = self.groups.get_raw(group_id).await?;

        let mut ids: Vec<String> = Vec::new();
        if let Some(miembros) = raw.shape.mobile_members() {
            ids.extend(
                miembros
                    .iter()
                    .filter(|m| !m.uid.is_empty())
                    .map(|m| m.uid.clone()),
            );
        }
        let known: HashSet<String> = raw
            .shape
            .mobile_members()
            .map(|miembros| {
                miembros
                    .iter()
                    .filter(|m| !m.uid.is_empty())
                    .map(|m| m.email.clone())
                    .collect()
            })
            .unwrap_or_default();
        let unresolved: Vec<String> = raw
            .member_emails()
            .into_iter()
            .filter(|email| !known.contains(email))
            .collect();
        let accounts = self.users.find_many_by_email(&unresolved).await?;
        for email in &unresolved {
            if let Some(account) = accounts.get(email) {
                ids.push(account.id.clone());
            }
        }

        let timer = QueryTimer::new("group_member_locations");
        let mut locations = Vec::new();
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.store.get(LOCATIONS, &id).await {
                Ok(Some(doc)) => locations.extend(normalize_location(&doc)),
                Ok(None) => {}
                Err(e) => warn!(user_id = %id, error = %e, "Failed to read member location"),
            }
        }
        timer.record();

        Ok(merge_newest_first(locations))
    }

    /// The caller's own location, if stored and valid.
    pub async fn my_location(&self, email: &str) -> Result<Option<Location>, SyncError> {
        let Some(account) = self.users.find_by_email(email).await? else {
            return Ok(None);
        };
        Ok(self
            .store
            .get(LOCATIONS, &account.id)
            .await?
            .as_ref()
            .and_then(normalize_location))
    }

    /// Starts sharing: marks the location online and the account online.
    pub async fn activate(&self, email: &str) -> Result<(), SyncError> {
        let account = self.users.require_by_email(email).await?;
        let existing = self.store.get(LOCATIONS, &account.id).await?;

        let mut batch = WriteBatch::new();
        if existing.is_some() {
            batch.update(
                LOCATIONS,
                &account.id,
                FieldUpdates::new()
                    .set("isOnline", true)
                    .set("lastActivated", store_now()),
            );
        } else {
            let mut fields = Fields::new();
            fields.insert("userId".into(), json!(account.id));
            fields.insert("userEmail".into(), json!(account.email));
            fields.insert("userName".into(), json!(account.name));
            fields.insert("isOnline".into(), json!(true));
            fields.insert("lastActivated".into(), store_now());
            batch.set(LOCATIONS, &account.id, fields);
        }
        batch.update(USERS, &account.id, presence(PresenceStatus::Online));
        self.store.commit(batch).await?;

        info!(user_id = %account.id, "Location sharing activated");
        Ok(())
    }

    /// Stops sharing. The stored position is kept.
    pub async fn deactivate(&self, email: &str) -> Result<(), SyncError> {
        let account = self.users.require_by_email(email).await?;

        let mut batch = WriteBatch::new();
        if self.store.get(LOCATIONS, &account.id).await?.is_some() {
            batch.update(
                LOCATIONS,
                &account.id,
                FieldUpdates::new()
                    .set("isOnline", false)
                    .set("lastDeactivated", store_now()),
            );
        }
        batch.update(USERS, &account.id, presence(PresenceStatus::Offline));
        self.store.commit(batch).await?;

        info!(user_id = %account.id, "Location sharing deactivated");
        Ok(())
    }

    /// Sharing state. Unknown users and read failures report inactive.
    pub async fn circle_status(&self, email: &str) -> CircleStatus {
        let account = match self.users.find_by_email(email).await {
            Ok(Some(account)) => account,
            Ok(None) => return CircleStatus::inactive(),
            Err(e) => {
                warn!(email = %email, error = %e, "Failed to read circle status");
                return CircleStatus::inactive();
            }
        };
        match self.store.get(LOCATIONS, &account.id).await {
            Ok(Some(doc)) => CircleStatus {
                active: doc.bool("isOnline").unwrap_or(false),
                last_update: doc.get("timestamp").and_then(parse_instant),
            },
            Ok(None) => CircleStatus::inactive(),
            Err(e) => {
                warn!(user_id = %account.id, error = %e, "Failed to read circle status");
                CircleStatus::inactive()
            }
        }
    }

    pub async fn clear(&self, user_id: &str) -> Result<(), SyncError> {
        self.store.delete(LOCATIONS, user_id).await?;
        info!(user_id = %user_id, "Location cleared");
        Ok(())
    }

    /// Deletes locations whose user record no longer exists.
    pub async fn cleanup_orphaned(&self) -> OrphanSweepReport {
        let all_locations = Query::collection(LOCATIONS);
        let all_users = Query::collection(USERS);
        let (locations, users) = match tokio::try_join!(
            self.store.query(&all_locations),
            self.store.query(&all_users),
        ) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Orphaned location sweep failed");
                return OrphanSweepReport {
                    errors: vec![e.to_string()],
                    ..Default::default()
                };
            }
        };

        let valid: HashSet<&str> = users.iter().map(|u| u.id.as_str()).collect();
        let mut batch = WriteBatch::new();
        for location in &locations {
            if !valid.contains(location.id.as_str()) {
                batch.delete(LOCATIONS, &location.id);
            }
        }

        let found = batch.len();
        let mut report = OrphanSweepReport {
            found,
            ..Default::default()
        };
        if found > 0 {
            match self.store.commit(batch).await {
                Ok(()) => report.cleaned = found,
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        record_sweep("orphaned_locations", report.cleaned, report.errors.len());
        info!(found = report.found, cleaned = report.cleaned, "Orphaned location sweep completed");
        report
    }

    /// Cross-checks accounts against location documents. With `email`, the
    /// report also covers that account's own location.
    pub async fn diagnose(&self, email: Option<&str>) -> Result<LocationDiagnosis, SyncError> {
        let all_users = Query::collection(USERS);
        let all_locations = Query::collection(LOCATIONS);
        let timer = QueryTimer::new("diagnose_locations");
        let result = tokio::try_join!(
            self.store.query(&all_users),
            self.store.query(&all_locations),
        );
        timer.record();
        let (users, locations) = result?;

        let mut diagnosis = LocationDiagnosis {
            total_users: users.len(),
            ..Default::default()
        };
        let by_email = accounts_by_email(&users);
        for (address, copies) in &by_email {
            if copies.len() > 1 {
                diagnosis.duplicate_users.push(address.clone());
                diagnosis
                    .issues
                    .push(format!("Duplicate user: {} ({} copies)", address, copies.len()));
            }
        }

        let user_ids: HashSet<&str> = users.iter().map(|u| u.id.as_str()).collect();
        for location in &locations {
            if !user_ids.contains(location.id.as_str()) {
                diagnosis.orphaned_locations.push(location.id.clone());
                diagnosis.issues.push(format!(
                    "Orphaned location: {} ({})",
                    location.id,
                    location.str("userEmail").unwrap_or("unknown")
                ));
                continue;
            }
            diagnosis.users_with_locations += 1;
            if normalize_location(location).is_some() {
                diagnosis.users_with_valid_coords += 1;
            }
        }

        if !diagnosis.duplicate_users.is_empty() {
            diagnosis.suggestions.push(format!(
                "Merge {} duplicated accounts",
                diagnosis.duplicate_users.len()
            ));
        }
        if !diagnosis.orphaned_locations.is_empty() {
            diagnosis.suggestions.push(format!(
                "Delete {} orphaned locations",
                diagnosis.orphaned_locations.len()
            ));
        }
        let missing_coords = diagnosis.users_with_locations - diagnosis.users_with_valid_coords;
        if missing_coords > 0 {
            diagnosis
                .suggestions
                .push(format!("{} users need to report a position", missing_coords));
        }

        if let Some(email) = email {
            match by_email.get(email).map(Vec::as_slice) {
                None | Some([]) => diagnosis.issues.push(format!("User not found: {}", email)),
                Some([account]) => {
                    match locations.iter().find(|l| l.id == account.id) {
                        None => {
                            diagnosis
                                .issues
                                .push(format!("User without location: {}", email));
                            diagnosis
                                .suggestions
                                .push(format!("Activate location sharing for {}", email));
                        }
                        Some(location) if normalize_location(location).is_none() => {
                            diagnosis
                                .issues
                                .push(format!("User without valid coordinates: {}", email));
                            diagnosis
                                .suggestions
                                .push("The user must share a position from the app".to_string());
                        }
                        Some(_) => {}
                    }
                }
                // Already listed with the other duplicates.
                Some(_) => {}
            }
        }

        Ok(diagnosis)
    }

    /// Merges duplicate accounts, deletes orphaned locations and gives
    /// every account without a location an offline placeholder.
    pub async fn auto_fix(&self) -> AutoFixReport {
        let duplicates = self.users.cleanup_duplicates().await;
        let orphans = self.cleanup_orphaned().await;

        let mut report = AutoFixReport {
            duplicates_cleaned: duplicates.cleaned,
            orphans_cleaned: orphans.cleaned,
            users_fixed: 0,
            errors: duplicates.errors,
        };
        report.errors.extend(orphans.errors);
        match self.create_missing().await {
            Ok(created) => report.users_fixed = created,
            Err(e) => {
                warn!(error = %e, "Failed to create missing locations");
                report.errors.push(e.to_string());
            }
        }

        info!(
            duplicates_cleaned = report.duplicates_cleaned,
            orphans_cleaned = report.orphans_cleaned,
            users_fixed = report.users_fixed,
            errors = report.errors.len(),
            "Location repair completed"
        );
        report
    }

    async fn create_missing(&self) -> Result<usize, SyncError> {
        let all_users = Query::collection(USERS);
        let all_locations = Query::collection(LOCATIONS);
        let (users, locations) = tokio::try_join!(
            self.store.query(&all_users),
            self.store.query(&all_locations),
        )?;

        let located: HashSet<&str> = locations.iter().map(|l| l.id.as_str()).collect();
        let mut batch = WriteBatch::new();
        for account in users.iter().filter_map(parse_account) {
            if located.contains(account.id.as_str()) {
                continue;
            }
            let name = if account.name.is_empty() {
                fallback_name(&account.email)
            } else {
                account.name.clone()
            };
            let mut fields = Fields::new();
            fields.insert("userId".into(), json!(account.id));
            fields.insert("userEmail".into(), json!(account.email));
            fields.insert("userName".into(), json!(name));
            fields.insert("isOnline".into(), json!(false));
            fields.insert("lastActivated".into(), store_now());
            batch.set(LOCATIONS, &account.id, fields);
        }

        let created = batch.len();
        if created > 0 {
            self.store.commit(batch).await?;
        }
        Ok(created)
    }

    /// Flags online locations not updated within `max_age` as offline.
    /// Locations without a readable timestamp count as stale.
    pub async fn mark_inactive(&self, max_age: Duration) -> InactiveSweepReport {
        let locations = match self.store.query(&Query::collection(LOCATIONS)).await {
            Ok(locations) => locations,
            Err(e) => {
                warn!(error = %e, "Inactive location sweep failed");
                return InactiveSweepReport { cleaned: 0, errors: 1 };
            }
        };

        let cutoff = Utc::now() - max_age;
        let mut batch = WriteBatch::new();
        for doc in &locations {
            if !doc.bool("isOnline").unwrap_or(false) {
                continue;
            }
            let stale = doc
                .get("timestamp")
                .and_then(parse_instant)
                .map(|at| at < cutoff)
                .unwrap_or(true);
            if stale {
                batch.update(
                    LOCATIONS,
                    &doc.id,
                    FieldUpdates::new()
                        .set("isOnline", false)
                        .set("lastSeen", store_now()),
                );
            }
        }

        let mut report = InactiveSweepReport::default();
        if !batch.is_empty() {
            let count = batch.len();
            match self.store.commit(batch).await {
                Ok(()) => report.cleaned = count,
                Err(e) => {
                    warn!(error = %e, "Failed to flag inactive locations");
                    report.errors = 1;
                }
            }
        }

        record_sweep("inactive_locations", report.cleaned, report.errors);
        info!(cleaned = report.cleaned, errors = report.errors, "Inactive location sweep completed");
        report
    }
}

fn presence(status: PresenceStatus) -> FieldUpdates {
    FieldUpdates::new()
        .set("status", status.as_str())
        .set("lastSeen", store_now())
}
