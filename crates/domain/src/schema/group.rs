//! Dual-shape group documents.
//!
//! A stored group may carry the web member array (`members`), the mobile
//! member array (`miembros`), both, or neither. [`RawGroup::classify`] tags the
//! document with its [`GroupShape`]; [`merge`] maps any shape to a
//! [`UnifiedGroup`] and [`plan_backfill`] computes the fields a group needs to
//! reach the `Both` shape. The backfill sweep and the sync health check both
//! go through [`plan_backfill`].

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use shared::time::{parse_instant, to_store_timestamp};
use shared::{Document, Fields};
use std::collections::HashMap;

use crate::models::group::{MemberRole, DEFAULT_GROUP_NAME, PHONE_PLACEHOLDER};
use crate::models::user::fallback_name;
use crate::models::{Account, MobileMember, UnifiedGroup};

/// Which physical member collections a group document carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupShape {
    WebOnly { members: Vec<String> },
    MobileOnly { miembros: Vec<MobileMember> },
    Both {
        members: Vec<String>,
        miembros: Vec<MobileMember>,
    },
    Neither,
}

impl GroupShape {
    pub fn web_members(&self) -> Option<&[String]> {
        match self {
            GroupShape::WebOnly { members } | GroupShape::Both { members, .. } => Some(members),
            _ => None,
        }
    }

    pub fn mobile_members(&self) -> Option<&[MobileMember]> {
        match self {
            GroupShape::MobileOnly { miembros } | GroupShape::Both { miembros, .. } => {
                Some(miembros)
            }
            _ => None,
        }
    }

    pub fn is_both(&self) -> bool {
        matches!(self, GroupShape::Both { .. })
    }
}

/// Shape-independent fields of a group document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupHeader {
    pub name: Option<String>,
    pub nombre: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub creator: Option<String>,
    pub codigo: Option<String>,
    pub tipo: Option<String>,
    pub members_uids: Option<Vec<String>>,
    pub pending_invitations: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub is_auto_synced: bool,
    pub last_sync_update: Option<DateTime<Utc>>,
}

/// A stored group document tagged with its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGroup {
    pub id: String,
    pub header: GroupHeader,
    pub shape: GroupShape,
}

impl RawGroup {
    pub fn classify(doc: &Document) -> Self {
        let members = doc.str_array("members");
        let miembros = doc.array("miembros").map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<MobileMember>(item.clone()).ok())
                .collect::<Vec<_>>()
        });

        let shape = match (members, miembros) {
            (Some(members), Some(miembros)) => GroupShape::Both { members, miembros },
            (Some(members), None) => GroupShape::WebOnly { members },
            (None, Some(miembros)) => GroupShape::MobileOnly { miembros },
            (None, None) => GroupShape::Neither,
        };

        let header = GroupHeader {
            name: doc.string("name"),
            nombre: doc.string("nombre"),
            description: doc.string("description"),
            created_by: doc.string("createdBy"),
            creator: doc.string("creator"),
            codigo: doc.string("codigo"),
            tipo: doc.string("tipo"),
            members_uids: doc.str_array("membersUids"),
            pending_invitations: doc.str_array("pendingInvitations").unwrap_or_default(),
            created_at: doc
                .get("createdAt")
                .or_else(|| doc.get("creadoEn"))
                .and_then(parse_instant),
            is_auto_synced: doc.bool("isAutoSynced").unwrap_or(false),
            last_sync_update: doc.get("lastSyncUpdate").and_then(parse_instant),
        };

        Self {
            id: doc.id.clone(),
            header,
            shape,
        }
    }

    /// Membership by email in either shape, or by account id in the mobile
    /// shape or the `membersUids` array.
    pub fn is_member(&self, email: &str, uid: Option<&str>) -> bool {
        let by_web = self
            .shape
            .web_members()
            .map(|members| members.iter().any(|m| m == email))
            .unwrap_or(false);
        let by_mobile = self
            .shape
            .mobile_members()
            .map(|miembros| {
                miembros.iter().any(|m| {
                    m.email == email || uid.map(|u| !u.is_empty() && m.uid == u).unwrap_or(false)
                })
            })
            .unwrap_or(false);
        let by_uid = match (uid, &self.header.members_uids) {
            (Some(uid), Some(uids)) if !uid.is_empty() => uids.iter().any(|u| u == uid),
            _ => false,
        };
        by_web || by_mobile || by_uid
    }

    /// True when exactly one member shape is present.
    pub fn needs_backfill(&self) -> bool {
        matches!(
            self.shape,
            GroupShape::WebOnly { .. } | GroupShape::MobileOnly { .. }
        )
    }

    /// Creator email: the web field, else the admin of the mobile shape.
    pub fn creator_email(&self) -> Option<String> {
        self.header.created_by.clone().or_else(|| {
            self.shape
                .mobile_members()
                .and_then(|miembros| miembros.iter().find(|m| m.is_admin()))
                .map(|m| m.email.clone())
                .filter(|email| !email.is_empty())
        })
    }

    /// Member emails as seen by the web shape, derived from the mobile shape
    /// when needed.
    pub fn member_emails(&self) -> Vec<String> {
        match self.shape.web_members() {
            Some(members) => members.to_vec(),
            None => self
                .shape
                .mobile_members()
                .map(|miembros| {
                    miembros
                        .iter()
                        .map(|m| m.email.clone())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Canonical form of any group shape.
pub fn merge(raw: &RawGroup) -> UnifiedGroup {
    let header = &raw.header;
    let members_uids = header.members_uids.clone().unwrap_or_else(|| {
        raw.shape
            .mobile_members()
            .map(|miembros| {
                miembros
                    .iter()
                    .map(|m| m.uid.clone())
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    });

    UnifiedGroup {
        id: raw.id.clone(),
        name: header
            .name
            .clone()
            .or_else(|| header.nombre.clone())
            .unwrap_or_else(|| DEFAULT_GROUP_NAME.to_string()),
        description: header.description.clone().unwrap_or_default(),
        created_by: raw.creator_email().unwrap_or_default(),
        members: raw.member_emails(),
        members_uids,
        pending_invitations: header.pending_invitations.clone(),
        created_at: header.created_at,
        is_auto_synced: header.is_auto_synced,
        last_sync_update: header.last_sync_update,
        codigo: header.codigo.clone(),
        nombre: header.nombre.clone(),
        tipo: header.tipo.clone(),
        creator: header.creator.clone(),
        miembros: raw.shape.mobile_members().map(<[MobileMember]>::to_vec),
    }
}

/// Mobile member record for an account.
pub fn mobile_member(account: &Account, created_by: Option<&str>) -> MobileMember {
    MobileMember {
        email: account.email.clone(),
        name: account.name.clone(),
        phone: PHONE_PLACEHOLDER.to_string(),
        uid: account.id.clone(),
        rol: Some(
            MemberRole::for_member(&account.email, created_by)
                .as_str()
                .to_string(),
        ),
    }
}

/// Mobile member record for an email with no registered account.
pub fn unregistered_member(email: &str, created_by: Option<&str>) -> MobileMember {
    MobileMember {
        email: email.to_string(),
        name: fallback_name(email),
        phone: PHONE_PLACEHOLDER.to_string(),
        uid: String::new(),
        rol: Some(MemberRole::for_member(email, created_by).as_str().to_string()),
    }
}

/// What has to be written for a group to carry both shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum BackfillPlan {
    UpToDate,
    /// Web shape present; these fields add the mobile shape.
    SynthesizeMobile(Fields),
    /// Mobile shape present; these fields add the web shape.
    SynthesizeWeb(Fields),
}

impl BackfillPlan {
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, BackfillPlan::UpToDate)
    }

    pub fn into_fields(self) -> Option<Fields> {
        match self {
            BackfillPlan::UpToDate => None,
            BackfillPlan::SynthesizeMobile(fields) | BackfillPlan::SynthesizeWeb(fields) => {
                Some(fields)
            }
        }
    }
}

/// Computes the patch that brings `raw` to the `Both` shape.
///
/// `accounts` maps member emails to registered accounts; emails without an
/// account still get a mobile record with an empty uid. Groups with neither
/// shape have nothing to synthesize from and are reported up to date.
pub fn plan_backfill(
    raw: &RawGroup,
    accounts: &HashMap<String, Account>,
    now: DateTime<Utc>,
) -> BackfillPlan {
    let header = &raw.header;
    match &raw.shape {
        GroupShape::Both { .. } | GroupShape::Neither => BackfillPlan::UpToDate,
        GroupShape::WebOnly { members } => {
            let created_by = header.created_by.as_deref();
            let miembros: Vec<MobileMember> = members
                .iter()
                .map(|email| match accounts.get(email) {
                    Some(account) => mobile_member(account, created_by),
                    None => unregistered_member(email, created_by),
                })
                .collect();

            let mut fields = Fields::new();
            fields.insert("miembros".into(), to_value(&miembros));
            if header.members_uids.is_none() {
                let uids: Vec<&str> = miembros
                    .iter()
                    .map(|m| m.uid.as_str())
                    .filter(|u| !u.is_empty())
                    .collect();
                fields.insert("membersUids".into(), json!(uids));
            }
            if header.nombre.is_none() {
                let name = header.name.as_deref().unwrap_or(DEFAULT_GROUP_NAME);
                fields.insert("nombre".into(), json!(name));
            }
            if header.creator.is_none() {
                let creator = created_by
                    .and_then(|email| accounts.get(email))
                    .map(|account| account.id.clone())
                    .unwrap_or_default();
                fields.insert("creator".into(), json!(creator));
            }
            stamp_sync(&mut fields, now);
            BackfillPlan::SynthesizeMobile(fields)
        }
        GroupShape::MobileOnly { miembros } => {
            let mut fields = Fields::new();
            fields.insert("members".into(), json!(raw.member_emails()));
            if header.members_uids.is_none() {
                let uids: Vec<&str> = miembros
                    .iter()
                    .map(|m| m.uid.as_str())
                    .filter(|u| !u.is_empty())
                    .collect();
                fields.insert("membersUids".into(), json!(uids));
            }
            if header.name.is_none() {
                let name = header.nombre.as_deref().unwrap_or(DEFAULT_GROUP_NAME);
                fields.insert("name".into(), json!(name));
            }
            if header.created_by.is_none() {
                if let Some(creator) = raw.creator_email() {
                    fields.insert("createdBy".into(), json!(creator));
                }
            }
            if header.description.is_none() {
                fields.insert("description".into(), json!(""));
            }
            fields.insert("pendingInvitations".into(), json!(header.pending_invitations));
            stamp_sync(&mut fields, now);
            BackfillPlan::SynthesizeWeb(fields)
        }
    }
}

fn stamp_sync(fields: &mut Fields, now: DateTime<Utc>) {
    fields.insert("isAutoSynced".into(), Value::Bool(true));
    fields.insert("lastSyncUpdate".into(), to_store_timestamp(now));
}

fn to_value(miembros: &[MobileMember]) -> Value {
    serde_json::to_value(miembros).unwrap_or_else(|_| Value::Array(Vec::new()))
}
