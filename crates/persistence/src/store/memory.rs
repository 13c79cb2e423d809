//! In-memory document store.
//!
//! Used as the development backend and as the test double. It can simulate
//! missing composite indexes and unsupported filters, and it records every
//! query it receives so tests can assert on fallback call counts.

use async_trait::async_trait;
use serde_json::Value;
use shared::codes::generate_document_id;
use shared::time::parse_instant;
use shared::{Document, Fields};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DocumentStore, Query, Snapshot, StoreError, Watch, WatchTarget, WriteBatch};

type Collection = BTreeMap<String, Fields>;

struct Watcher {
    target: WatchTarget,
    tx: mpsc::UnboundedSender<Snapshot>,
    token: CancellationToken,
}

impl Watcher {
    fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    watchers: Vec<Watcher>,
    query_log: Vec<Query>,
    watch_log: Vec<WatchTarget>,
    missing_indexes: HashSet<(String, String)>,
    failing_fields: HashSet<(String, String)>,
    read_only: HashSet<String>,
    unavailable: bool,
}

impl State {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn run(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        for filter in &query.filters {
            let key = (query.collection.clone(), filter.field().to_string());
            if self.failing_fields.contains(&key) {
                return Err(StoreError::Unsupported(query.describe()));
            }
        }
        if let Some(field) = &query.order_by_desc {
            let key = (query.collection.clone(), field.clone());
            if !query.filters.is_empty() && self.missing_indexes.contains(&key) {
                return Err(StoreError::MissingIndex(query.describe()));
            }
        }

        let mut docs: Vec<Document> = self
            .collections
            .get(&query.collection)
            .map(|collection| {
                collection
                    .iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .filter(|doc| query.matches(doc))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(field) = &query.order_by_desc {
            docs.sort_by(|a, b| compare_desc(a.get(field), b.get(field)));
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    fn snapshot(&self, target: &WatchTarget) -> Snapshot {
        match target {
            WatchTarget::Query(query) => self.run(query),
            WatchTarget::Document { collection, id } => {
                self.check_available()?;
                Ok(self
                    .collections
                    .get(collection)
                    .and_then(|c| c.get(id))
                    .map(|fields| vec![Document::new(id.clone(), fields.clone())])
                    .unwrap_or_default())
            }
        }
    }

    /// Pushes a fresh snapshot to every watcher of the touched collections.
    /// Watchers whose snapshot failed are dropped after the error is sent.
    fn notify(&mut self, touched: &HashSet<String>) {
        self.watchers.retain(|w| !w.is_closed());
        let mut failed = Vec::new();
        for (index, watcher) in self.watchers.iter().enumerate() {
            if !touched.contains(watcher.target.collection()) {
                continue;
            }
            let snapshot = self.snapshot(&watcher.target);
            let is_err = snapshot.is_err();
            if watcher.tx.send(snapshot).is_err() || is_err {
                failed.push(index);
            }
        }
        for index in failed.into_iter().rev() {
            self.watchers.remove(index);
        }
    }
}

/// Orders values descending: store timestamps by instant, numbers
/// numerically, strings lexically.
fn compare_desc(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let instant = |v: Option<&Value>| v.and_then(parse_instant);
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => match (instant(a), instant(b)) {
            (Some(x), Some(y)) => y.cmp(&x),
            _ => y.cmp(x),
        },
        _ => match (instant(a), instant(b)) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

/// Thread-safe in-memory store. Cloning yields another handle to the same
/// data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes ordered filtered queries on `field` fail as if the composite
    /// index were missing.
    pub fn with_missing_index(self, collection: &str, field: &str) -> Self {
        self.state()
            .missing_indexes
            .insert((collection.to_string(), field.to_string()));
        self
    }

    /// Makes every query filtering on `field` fail.
    pub fn with_failing_field(self, collection: &str, field: &str) -> Self {
        self.state()
            .failing_fields
            .insert((collection.to_string(), field.to_string()));
        self
    }

    /// Makes every write touching `collection` fail. Reads keep working.
    pub fn with_read_only(self, collection: &str) -> Self {
        self.state().read_only.insert(collection.to_string());
        self
    }

    /// Toggles a simulated outage: every operation fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Writes a document directly and notifies watchers. Non-object values
    /// store an empty document.
    pub fn seed(&self, collection: &str, id: &str, value: Value) {
        let doc = Document::from_value(id, value);
        let mut state = self.state();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id, doc.fields);
        let touched = HashSet::from([collection.to_string()]);
        state.notify(&touched);
    }

    /// Reads a document without going through the query log.
    pub fn peek(&self, collection: &str, id: &str) -> Option<Document> {
        self.state()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone()))
    }

    pub fn count(&self, collection: &str) -> usize {
        self.state()
            .collections
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Every one-shot query issued so far, in order.
    pub fn queries(&self) -> Vec<Query> {
        self.state().query_log.clone()
    }

    /// Every watch started so far, in order.
    pub fn watches(&self) -> Vec<WatchTarget> {
        self.state().watch_log.clone()
    }

    pub fn clear_logs(&self) {
        let mut state = self.state();
        state.query_log.clear();
        state.watch_log.clear();
    }

    /// Watchers still attached.
    pub fn active_watchers(&self) -> usize {
        let mut state = self.state();
        state.watchers.retain(|w| !w.is_closed());
        state.watchers.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut state = self.state();
        state.query_log.push(query.clone());
        state.run(query)
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = generate_document_id();
        let mut batch = WriteBatch::new();
        batch.set(collection, &id, fields);
        self.commit(batch).await?;
        Ok(id)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_available()?;
        if let Some(op) = batch
            .ops()
            .iter()
            .find(|op| state.read_only.contains(op.collection()))
        {
            return Err(StoreError::Backend(format!(
                "{} is read-only",
                op.collection()
            )));
        }

        // Stage every op first so a failing op leaves the store untouched.
        let mut staged: BTreeMap<(String, String), Option<Fields>> = BTreeMap::new();
        for op in batch.ops() {
            let key = (op.collection().to_string(), op.id().to_string());
            let current = match staged.get(&key) {
                Some(pending) => pending.clone(),
                None => state
                    .collections
                    .get(op.collection())
                    .and_then(|c| c.get(op.id()))
                    .cloned(),
            };
            let next = op.apply(current)?;
            staged.insert(key, next);
        }

        let mut touched = HashSet::new();
        for ((collection, id), next) in staged {
            let docs = state.collections.entry(collection.clone()).or_default();
            match next {
                Some(fields) => {
                    docs.insert(id, fields);
                }
                None => {
                    docs.remove(&id);
                }
            }
            touched.insert(collection);
        }
        state.notify(&touched);
        Ok(())
    }

    async fn watch(&self, target: WatchTarget) -> Result<Watch, StoreError> {
        let mut state = self.state();
        state.watch_log.push(target.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let first = state.snapshot(&target);
        let failed = first.is_err();
        // The receiver is alive here, so the send cannot fail.
        let _ = tx.send(first);
        if !failed {
            state.watchers.push(Watcher {
                target,
                tx,
                token: token.clone(),
            });
        }
        Ok(Watch::new(rx, token))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.state().check_available()
    }
}
