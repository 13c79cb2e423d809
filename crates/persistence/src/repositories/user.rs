//! Account lookups.

use domain::models::user::{fallback_name, DuplicateSweepReport, PresenceStatus};
use domain::models::Account;
use domain::schema::parse_account;
use serde_json::json;
use shared::time::{parse_instant, store_now};
use shared::Document;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::collections::{LOCATIONS, USERS};
use crate::error::SyncError;
use crate::metrics::{record_sweep, QueryTimer};
use crate::store::{FieldUpdates, Query, SharedStore, WriteBatch};

/// Repository for registered accounts.
#[derive(Clone)]
pub struct UserRepository {
    store: SharedStore,
}

impl UserRepository {
    /// Creates a new UserRepository with the given store handle.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Find account by email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, SyncError> {
        let timer = QueryTimer::new("find_user_by_email");
        let result = self
            .store
            .query(&Query::collection(USERS).where_eq("email", email).limit(1))
            .await;
        timer.record();
        Ok(result?.iter().find_map(parse_account))
    }

    /// Find account by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Account>, SyncError> {
        let timer = QueryTimer::new("find_user_by_id");
        let result = self.store.get(USERS, id).await;
        timer.record();
        Ok(result?.as_ref().and_then(parse_account))
    }

    /// Like [`find_by_email`](Self::find_by_email) but missing accounts are an
    /// error.
    pub async fn require_by_email(&self, email: &str) -> Result<Account, SyncError> {
        self.find_by_email(email)
            .await?
            .ok_or_else(|| SyncError::not_found("User", email))
    }

    /// Accounts for the given emails, keyed by email. Unregistered emails are
    /// absent from the map.
    pub async fn find_many_by_email(
        &self,
        emails: &[String],
    ) -> Result<HashMap<String, Account>, SyncError> {
        let mut accounts = HashMap::new();
        for email in emails {
            if accounts.contains_key(email) {
                continue;
            }
            if let Some(account) = self.find_by_email(email).await? {
                accounts.insert(email.clone(), account);
            }
        }
        Ok(accounts)
    }

    pub async fn exists(&self, id: &str) -> Result<bool, SyncError> {
        Ok(self.store.get(USERS, id).await?.is_some())
    }

    /// Update the presence status shown to other members.
    pub async fn set_status(&self, id: &str, status: PresenceStatus) -> Result<(), SyncError> {
        let timer = QueryTimer::new("set_user_status");
        let result = self
            .store
            .update(USERS, id, FieldUpdates::new().set("status", status.as_str()))
            .await;
        timer.record();
        Ok(result?)
    }

    /// Merges account documents that share an email.
    ///
    /// The most recently created account is kept. A location owned by a
    /// removed account moves to the kept account unless that one already
    /// has a location. Each email is repaired in one batch; failures are
    /// collected and the sweep continues.
    pub async fn cleanup_duplicates(&self) -> DuplicateSweepReport {
        let timer = QueryTimer::new("list_users");
        let result = self.store.query(&Query::collection(USERS)).await;
        timer.record();
        let users = match result {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Duplicate account sweep failed");
                return DuplicateSweepReport {
                    errors: vec![e.to_string()],
                    ..Default::default()
                };
            }
        };

        let mut report = DuplicateSweepReport::default();
        for (email, mut copies) in accounts_by_email(&users) {
            if copies.len() < 2 {
                continue;
            }
            report.found += 1;
            copies.sort_by(|a, b| created_at(b).cmp(&created_at(a)).then_with(|| a.id.cmp(&b.id)));
            let Some((keep, removed)) = copies.split_first() else {
                continue;
            };
            match self.merge_into(&email, keep, removed).await {
                Ok(()) => report.cleaned += removed.len(),
                Err(e) => {
                    warn!(email = %email, error = %e, "Failed to merge duplicate accounts");
                    report.errors.push(format!("{}: {}", email, e));
                }
            }
        }

        record_sweep("duplicate_users", report.cleaned, report.errors.len());
        info!(
            found = report.found,
            cleaned = report.cleaned,
            "Duplicate account sweep completed"
        );
        report
    }

    async fn merge_into(
        &self,
        email: &str,
        keep: &Document,
        removed: &[&Document],
    ) -> Result<(), SyncError> {
        let mut has_location = self.store.get(LOCATIONS, &keep.id).await?.is_some();
        let name = keep.string("name").unwrap_or_else(|| fallback_name(email));

        let mut batch = WriteBatch::new();
        for duplicate in removed {
            if let Some(location) = self.store.get(LOCATIONS, &duplicate.id).await? {
                if !has_location {
                    let mut fields = location.fields;
                    fields.insert("userId".into(), json!(keep.id));
                    fields.insert("userEmail".into(), json!(email));
                    fields.insert("userName".into(), json!(name));
                    fields.insert("lastUpdate".into(), store_now());
                    fields.insert("migratedFrom".into(), json!(duplicate.id));
                    batch.set(LOCATIONS, &keep.id, fields);
                    has_location = true;
                }
                batch.delete(LOCATIONS, &duplicate.id);
            }
            batch.delete(USERS, &duplicate.id);
        }

        let timer = QueryTimer::new("merge_duplicate_users");
        let result = self.store.commit(batch).await;
        timer.record();
        result?;

        info!(email = %email, kept = %keep.id, removed = removed.len(), "Duplicate accounts merged");
        Ok(())
    }
}

/// Account documents grouped by email. Documents without one are skipped.
pub(crate) fn accounts_by_email(users: &[Document]) -> BTreeMap<String, Vec<&Document>> {
    let mut by_email: BTreeMap<String, Vec<&Document>> = BTreeMap::new();
    for doc in users {
        if let Some(email) = doc.string("email") {
            by_email.entry(email).or_default().push(doc);
        }
    }
    by_email
}

fn created_at(doc: &Document) -> Option<chrono::DateTime<chrono::Utc>> {
    doc.get("createdAt").and_then(parse_instant)
}
