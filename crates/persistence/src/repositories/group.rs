//! Dual-shape group reconciliation.
//!
//! Groups are read through [`RawGroup::classify`] and written so that both the
//! web member array and the mobile member records stay populated.

use chrono::Utc;
use domain::models::group::{
    is_valid_group_code, NewGroup, SweepReport, SyncHealth, DEFAULT_GROUP_TYPE,
};
use domain::models::{Account, MobileMember, UnifiedGroup};
use domain::schema::group::{mobile_member, unregistered_member};
use domain::schema::{merge, plan_backfill, BackfillPlan, RawGroup};
use serde_json::{json, Value};
use shared::codes::generate_group_code;
use shared::time::store_now;
use shared::{Document, Fields};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::collections::{GROUPS, INVITATIONS};
use crate::error::SyncError;
use crate::metrics::{record_sweep, QueryTimer};
use crate::repositories::UserRepository;
use crate::store::{FieldUpdates, Query, SharedStore, WriteBatch};

/// Repository for group documents in either shape.
#[derive(Clone)]
pub struct GroupRepository {
    store: SharedStore,
    users: UserRepository,
}

impl GroupRepository {
    /// Creates a new GroupRepository with the given store handle.
    pub fn new(store: SharedStore) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            store,
        }
    }

    /// Creates a group carrying both shapes from the start.
    pub async fn create_group(&self, group: NewGroup) -> Result<UnifiedGroup, SyncError> {
        group.validate()?;

        let mut members = vec![group.created_by.clone()];
        for email in &group.members {
            if !members.contains(email) {
                members.push(email.clone());
            }
        }

        let mut fields = Fields::new();
        fields.insert("name".into(), json!(group.name));
        fields.insert("description".into(), json!(group.description));
        fields.insert("createdBy".into(), json!(group.created_by));
        fields.insert("members".into(), json!(members));
        fields.insert("pendingInvitations".into(), json!([]));
        fields.insert("createdAt".into(), store_now());
        fields.insert("creadoEn".into(), store_now());

        let accounts = self.users.find_many_by_email(&members).await?;
        let raw = RawGroup::classify(&Document::new("", fields.clone()));
        let mobile = self.with_mobile_extras(&raw, plan_backfill(&raw, &accounts, Utc::now()));
        if let Some(extra) = mobile.into_fields() {
            fields.extend(extra);
        }

        let timer = QueryTimer::new("create_group");
        let result = self.store.add(GROUPS, fields.clone()).await;
        timer.record();
        let id = result?;

        info!(group_id = %id, name = %group.name, members = members.len(), "Group created");
        Ok(merge(&RawGroup::classify(&Document::new(id, fields))))
    }

    /// Reads a group in its stored shape.
    pub async fn get_raw(&self, group_id: &str) -> Result<RawGroup, SyncError> {
        let timer = QueryTimer::new("get_group");
        let result = self.store.get(GROUPS, group_id).await;
        timer.record();
        result?
            .map(|doc| RawGroup::classify(&doc))
            .ok_or_else(|| SyncError::not_found("Group", group_id))
    }

    pub async fn get_group(&self, group_id: &str) -> Result<UnifiedGroup, SyncError> {
        Ok(merge(&self.get_raw(group_id).await?))
    }

    async fn all_raw(&self) -> Result<Vec<RawGroup>, SyncError> {
        let timer = QueryTimer::new("list_groups");
        let result = self.store.query(&Query::collection(GROUPS)).await;
        timer.record();
        Ok(result?.iter().map(RawGroup::classify).collect())
    }

    /// Groups the user belongs to by either shape, in stored form.
    pub async fn user_raw_groups(&self, email: &str) -> Result<Vec<RawGroup>, SyncError> {
        let uid = self.users.find_by_email(email).await?.map(|a| a.id);
        Ok(self
            .all_raw()
            .await?
            .into_iter()
            .filter(|raw| raw.is_member(email, uid.as_deref()))
            .collect())
    }

    /// Groups the user belongs to by either shape.
    pub async fn user_groups(&self, email: &str) -> Result<Vec<UnifiedGroup>, SyncError> {
        Ok(self
            .user_raw_groups(email)
            .await?
            .iter()
            .map(merge)
            .collect())
    }

    /// Adds a registered account to both member shapes. Returns false when
    /// the account was already present in every shape the group carries.
    pub async fn upsert_member(&self, group_id: &str, email: &str) -> Result<bool, SyncError> {
        let raw = self.get_raw(group_id).await?;
        let account = self.users.require_by_email(email).await?;

        let Some(updates) = self.membership_updates(&raw, &account).await? else {
            debug!(group_id = %group_id, email = %email, "Member already present");
            return Ok(false);
        };

        let timer = QueryTimer::new("upsert_member");
        let result = self.store.update(GROUPS, group_id, updates).await;
        timer.record();
        result?;

        info!(group_id = %group_id, email = %email, "Member added");
        Ok(true)
    }

    /// Field mutations that add `account` to every member shape.
    ///
    /// An existing mobile array is only ever appended to, so stored entries
    /// the parser could not read survive the write.
    pub(crate) async fn membership_updates(
        &self,
        raw: &RawGroup,
        account: &Account,
    ) -> Result<Option<FieldUpdates>, SyncError> {
        let email = account.email.as_str();
        let creator = raw.creator_email();
        let in_web = raw
            .shape
            .web_members()
            .map(|members| members.iter().any(|m| m == email));
        let in_mobile = raw
            .shape
            .mobile_members()
            .map(|miembros| miembros.iter().any(|m| m.email == email));
        let in_uids = raw
            .header
            .members_uids
            .as_ref()
            .map(|uids| uids.contains(&account.id))
            .unwrap_or(false);

        if in_web == Some(true) && in_mobile == Some(true) && in_uids {
            return Ok(None);
        }

        let mut updates = FieldUpdates::new();
        match in_web {
            Some(true) => {}
            Some(false) => updates = updates.array_union("members", vec![json!(email)]),
            None => {
                let mut members = raw.member_emails();
                members.push(email.to_string());
                updates = updates.set("members", json!(members));
            }
        }

        let mut written: Option<Vec<MobileMember>> = None;
        if in_mobile != Some(true) {
            let added = mobile_member(account, creator.as_deref());
            let miembros = match raw.shape.mobile_members() {
                Some(existing) => {
                    updates = updates.array_union("miembros", vec![member_value(&added)]);
                    let mut miembros = existing.to_vec();
                    miembros.push(added);
                    miembros
                }
                None => {
                    let current = raw.member_emails();
                    let accounts = self.users.find_many_by_email(&current).await?;
                    let mut miembros: Vec<MobileMember> = current
                        .iter()
                        .map(|e| match accounts.get(e) {
                            Some(a) => mobile_member(a, creator.as_deref()),
                            None => unregistered_member(e, creator.as_deref()),
                        })
                        .collect();
                    miembros.push(added);
                    updates = updates.set("miembros", members_value(&miembros));
                    miembros
                }
            };
            written = Some(miembros);
        }

        if raw.header.members_uids.is_none() {
            let mut uids: Vec<String> = written
                .as_deref()
                .or(raw.shape.mobile_members())
                .map(|miembros| {
                    miembros
                        .iter()
                        .map(|m| m.uid.clone())
                        .filter(|u| !u.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            if !uids.contains(&account.id) {
                uids.push(account.id.clone());
            }
            updates = updates.set("membersUids", json!(uids));
        } else if !in_uids {
            updates = updates.array_union("membersUids", vec![json!(account.id)]);
        }
        Ok(Some(updates))
    }

    /// Removes an email from both member shapes.
    ///
    /// Mobile entries are removed by their stored value; every other entry
    /// is left as stored.
    pub async fn remove_member(&self, group_id: &str, email: &str) -> Result<(), SyncError> {
        let timer = QueryTimer::new("get_group");
        let result = self.store.get(GROUPS, group_id).await;
        timer.record();
        let doc = result?.ok_or_else(|| SyncError::not_found("Group", group_id))?;
        let raw = RawGroup::classify(&doc);

        let mut updates = FieldUpdates::new();
        let mut uids: Vec<Value> = Vec::new();

        if raw.shape.web_members().is_some() {
            updates = updates.array_remove("members", vec![json!(email)]);
        }
        if let Some(stored) = doc.array("miembros") {
            let removed: Vec<Value> = stored
                .iter()
                .filter(|item| item.get("email").and_then(Value::as_str) == Some(email))
                .cloned()
                .collect();
            uids.extend(
                removed
                    .iter()
                    .filter_map(|item| item.get("uid").and_then(Value::as_str))
                    .filter(|uid| !uid.is_empty())
                    .map(|uid| json!(uid)),
            );
            if !removed.is_empty() {
                updates = updates.array_remove("miembros", removed);
            }
        }
        if uids.is_empty() {
            if let Some(account) = self.users.find_by_email(email).await? {
                uids.push(json!(account.id));
            }
        }
        if raw.header.members_uids.is_some() && !uids.is_empty() {
            updates = updates.array_remove("membersUids", uids);
        }
        if updates.is_empty() {
            return Ok(());
        }

        let timer = QueryTimer::new("remove_member");
        let result = self.store.update(GROUPS, group_id, updates).await;
        timer.record();
        result?;

        info!(group_id = %group_id, email = %email, "Member removed");
        Ok(())
    }

    /// Patches every group that carries only one member shape.
    ///
    /// Per-group failures are counted and the sweep continues.
    pub async fn backfill_all(&self) -> Result<SweepReport, SyncError> {
        let groups = self.all_raw().await?;
        let mut report = SweepReport::default();

        for raw in groups {
            report.processed += 1;
            if !raw.needs_backfill() {
                continue;
            }
            match self.backfill(&raw).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(group_id = %raw.id, error = %e, "Failed to backfill group");
                    report.errors += 1;
                    report.failures.push(raw.id.clone());
                }
            }
        }

        record_sweep("group_backfill", report.updated, report.errors);
        info!(
            processed = report.processed,
            updated = report.updated,
            errors = report.errors,
            "Group backfill sweep completed"
        );
        Ok(report)
    }

    /// Brings one group to the dual shape. Returns false when it already
    /// carried both shapes.
    pub async fn force_sync_group(&self, group_id: &str) -> Result<bool, SyncError> {
        let raw = self.get_raw(group_id).await?;
        if !raw.needs_backfill() {
            debug!(group_id = %group_id, "Group already carries both shapes");
            return Ok(false);
        }
        let updated = self.backfill(&raw).await?;
        info!(group_id = %group_id, updated, "Group synced");
        Ok(updated)
    }

    async fn backfill(&self, raw: &RawGroup) -> Result<bool, SyncError> {
        let mut emails = raw.member_emails();
        if let Some(creator) = raw.creator_email() {
            emails.push(creator);
        }
        let accounts = self.users.find_many_by_email(&emails).await?;
        let plan = self.with_mobile_extras(raw, plan_backfill(raw, &accounts, Utc::now()));
        let Some(fields) = plan.into_fields() else {
            return Ok(false);
        };

        let timer = QueryTimer::new("backfill_group");
        let result = self.store.set(GROUPS, &raw.id, fields, true).await;
        timer.record();
        result?;

        debug!(group_id = %raw.id, "Group backfilled");
        Ok(true)
    }

    /// Mobile-only header fields that the pure plan leaves to the writer.
    /// A missing or malformed join code is replaced.
    fn with_mobile_extras(&self, raw: &RawGroup, plan: BackfillPlan) -> BackfillPlan {
        match plan {
            BackfillPlan::SynthesizeMobile(mut fields) => {
                let has_code = raw
                    .header
                    .codigo
                    .as_deref()
                    .map(is_valid_group_code)
                    .unwrap_or(false);
                if !has_code {
                    if let Some(code) = &raw.header.codigo {
                        debug!(group_id = %raw.id, code = %code, "Replacing malformed join code");
                    }
                    fields.insert("codigo".into(), json!(generate_group_code()));
                }
                if raw.header.tipo.is_none() {
                    fields.insert("tipo".into(), json!(DEFAULT_GROUP_TYPE));
                }
                BackfillPlan::SynthesizeMobile(fields)
            }
            other => other,
        }
    }

    /// Share of the user's groups that already carry both shapes.
    pub async fn sync_health(&self, email: &str) -> Result<SyncHealth, SyncError> {
        let groups = self.user_raw_groups(email).await?;
        let none = HashMap::new();
        let now = Utc::now();

        let needs_update: Vec<String> = groups
            .iter()
            .filter(|raw| !plan_backfill(raw, &none, now).is_up_to_date())
            .map(|raw| raw.id.clone())
            .collect();
        let synced = groups.len() - needs_update.len();
        Ok(SyncHealth::from_counts(groups.len(), synced, needs_update))
    }

    /// Deletes a group and its pending invitations. Only the creator may.
    pub async fn delete_group(&self, group_id: &str, requester: &str) -> Result<(), SyncError> {
        let raw = self.get_raw(group_id).await?;
        if raw.creator_email().as_deref() != Some(requester) {
            return Err(SyncError::Forbidden(
                "Only the group creator can delete the group".into(),
            ));
        }

        let pending = self
            .store
            .query(
                &Query::collection(INVITATIONS)
                    .where_eq("groupId", group_id)
                    .where_eq("status", "pending"),
            )
            .await?;

        let mut batch = WriteBatch::new();
        batch.delete(GROUPS, group_id);
        for invitation in &pending {
            batch.delete(INVITATIONS, &invitation.id);
        }

        let timer = QueryTimer::new("delete_group");
        let result = self.store.commit(batch).await;
        timer.record();
        result?;

        info!(
            group_id = %group_id,
            invitations = pending.len(),
            "Group deleted"
        );
        Ok(())
    }
}

fn members_value(miembros: &[MobileMember]) -> Value {
    Value::Array(miembros.iter().map(member_value).collect())
}

fn member_value(member: &MobileMember) -> Value {
    serde_json::to_value(member).unwrap_or_else(|_| json!({ "email": member.email }))
}
