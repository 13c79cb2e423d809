//! Common fixtures for the persistence integration tests.
//!
//! Every test runs against its own in-memory store, so no external services
//! are needed.

// Not every test file uses every fixture.
#![allow(dead_code)]

use domain::services::PrecisionPolicy;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use persistence::collections::{GROUPS, USERS};
use persistence::{CirclesContext, MemoryStore, SharedStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

static SEQUENCE: AtomicUsize = AtomicUsize::new(0);

fn next_id(prefix: &str) -> String {
    format!("{}{}", prefix, SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// A registered account seeded into the users collection.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl TestUser {
    pub fn new() -> Self {
        let email: String = SafeEmail().fake();
        let id = next_id("user");
        Self {
            email: format!("{}.{}", id, email),
            name: Name().fake(),
            id,
        }
    }
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh store plus a context over it with a short debounce.
pub fn test_context() -> (MemoryStore, CirclesContext) {
    test_context_with(MemoryStore::new())
}

pub fn test_context_with(store: MemoryStore) -> (MemoryStore, CirclesContext) {
    let shared: SharedStore = Arc::new(store.clone());
    let ctx = CirclesContext::new(shared, PrecisionPolicy::default())
        .with_debounce(Duration::from_millis(30));
    (store, ctx)
}

pub fn seed_user(store: &MemoryStore) -> TestUser {
    let user = TestUser::new();
    store.seed(USERS, &user.id, json!({"email": user.email, "name": user.name}));
    user
}

/// Group with only the web member array.
pub fn seed_web_group(store: &MemoryStore, creator: &TestUser, members: &[&TestUser]) -> String {
    let id = next_id("web");
    let emails: Vec<&str> = std::iter::once(creator)
        .chain(members.iter().copied())
        .map(|u| u.email.as_str())
        .collect();
    store.seed(
        GROUPS,
        &id,
        json!({
            "name": "Familia",
            "description": "",
            "createdBy": creator.email,
            "members": emails,
            "pendingInvitations": [],
        }),
    );
    id
}

/// Group with only the mobile member records.
pub fn seed_mobile_group(store: &MemoryStore, admin: &TestUser, members: &[&TestUser]) -> String {
    let id = next_id("mobile");
    let mut miembros: Vec<Value> = vec![mobile_record(admin, "admin")];
    miembros.extend(members.iter().map(|u| mobile_record(u, "familiar")));
    store.seed(
        GROUPS,
        &id,
        json!({
            "nombre": "Casa",
            "codigo": "AB12CD",
            "tipo": "familia",
            "creator": admin.id,
            "miembros": miembros,
        }),
    );
    id
}

fn mobile_record(user: &TestUser, rol: &str) -> Value {
    json!({
        "email": user.email,
        "name": user.name,
        "phone": "5550000000",
        "uid": user.id,
        "rol": rol,
    })
}

/// Store-native timestamp `seconds` after the epoch.
pub fn ts(seconds: i64) -> Value {
    json!({"seconds": seconds, "nanoseconds": 0})
}
