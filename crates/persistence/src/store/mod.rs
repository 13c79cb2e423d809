//! Document store boundary.
//!
//! The store is schema-less: collections of JSON documents addressed by id,
//! equality and array-contains filters, descending ordering, batched writes
//! and live watches that deliver the full current result set on every change.
//! Ordered queries only return documents that carry the order field.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use shared::{Document, Fields};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Composite query (filter + order) without a supporting index.
    #[error("Query requires an index: {0}")]
    MissingIndex(String),

    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Failures caused by the shape of the query rather than the store's state.
    pub fn is_query_shape(&self) -> bool {
        matches!(self, StoreError::MissingIndex(_) | StoreError::Unsupported(_))
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// A single query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    ArrayContains { field: String, value: Value },
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. } | Filter::ArrayContains { field, .. } => field,
        }
    }

    /// Typed equality as JSONB compares it: a number never equals a string,
    /// and numbers compare by value whatever their representation.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq { field, value } => doc
                .fields
                .get(field)
                .map(|stored| json_eq(stored, value))
                .unwrap_or(false),
            Filter::ArrayContains { field, value } => doc
                .array(field)
                .map(|items| items.iter().any(|item| json_eq(item, value)))
                .unwrap_or(false),
        }
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by_desc: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by_desc: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by_desc = Some(field.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Same query without the ordering clause.
    pub fn unordered(&self) -> Self {
        Self {
            order_by_desc: None,
            ..self.clone()
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.order_by_desc.is_some()
    }

    /// Filter and order-field membership test; ordering and limit excluded.
    pub fn matches(&self, doc: &Document) -> bool {
        let has_order_field = self
            .order_by_desc
            .as_deref()
            .map(|field| doc.has(field))
            .unwrap_or(true);
        has_order_field && self.filters.iter().all(|f| f.matches(doc))
    }

    /// Short description used in logs and metric labels.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.collection.clone()];
        for filter in &self.filters {
            match filter {
                Filter::Eq { field, .. } => parts.push(format!("{}==", field)),
                Filter::ArrayContains { field, .. } => parts.push(format!("{}[]", field)),
            }
        }
        if let Some(field) = &self.order_by_desc {
            parts.push(format!("desc({})", field));
        }
        parts.join(":")
    }
}

/// Field-level mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    /// Appends values not already present.
    ArrayUnion(Vec<Value>),
    /// Removes every element equal to one of the values.
    ArrayRemove(Vec<Value>),
    Delete,
}

/// Ordered list of field mutations for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdates(Vec<(String, FieldOp)>);

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((field.into(), FieldOp::Set(value.into())));
        self
    }

    pub fn array_union(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.0.push((field.into(), FieldOp::ArrayUnion(values)));
        self
    }

    pub fn array_remove(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.0.push((field.into(), FieldOp::ArrayRemove(values)));
        self
    }

    pub fn delete(mut self, field: impl Into<String>) -> Self {
        self.0.push((field.into(), FieldOp::Delete));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ops(&self) -> &[(String, FieldOp)] {
        &self.0
    }

    /// Applies the mutations in order.
    pub fn apply(&self, fields: &mut Fields) {
        for (field, op) in &self.0 {
            match op {
                FieldOp::Set(value) => {
                    fields.insert(field.clone(), value.clone());
                }
                FieldOp::Delete => {
                    fields.remove(field);
                }
                FieldOp::ArrayUnion(values) => {
                    let mut items = match fields.remove(field) {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    };
                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                    fields.insert(field.clone(), Value::Array(items));
                }
                FieldOp::ArrayRemove(values) => {
                    let mut items = match fields.remove(field) {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    };
                    items.retain(|item| !values.contains(item));
                    fields.insert(field.clone(), Value::Array(items));
                }
            }
        }
    }
}

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Creates or replaces the document; with `merge` only the given fields
    /// are overwritten.
    Set {
        collection: String,
        id: String,
        fields: Fields,
        merge: bool,
    },
    /// Mutates an existing document. Fails with `NotFound` when absent.
    Update {
        collection: String,
        id: String,
        updates: FieldUpdates,
    },
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Set { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WriteOp::Set { id, .. } | WriteOp::Update { id, .. } | WriteOp::Delete { id, .. } => {
                id
            }
        }
    }

    /// New state of the document after this op, `None` meaning deleted.
    pub fn apply(&self, existing: Option<Fields>) -> Result<Option<Fields>, StoreError> {
        match self {
            WriteOp::Set { fields, merge, .. } => {
                let mut next = if *merge {
                    existing.unwrap_or_default()
                } else {
                    Fields::new()
                };
                for (key, value) in fields {
                    next.insert(key.clone(), value.clone());
                }
                Ok(Some(next))
            }
            WriteOp::Update {
                collection,
                id,
                updates,
            } => {
                let mut fields = existing.ok_or_else(|| StoreError::not_found(collection, id))?;
                updates.apply(&mut fields);
                Ok(Some(fields))
            }
            WriteOp::Delete { .. } => Ok(None),
        }
    }
}

/// Writes applied together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: &str, id: &str, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            merge: false,
        });
        self
    }

    pub fn set_merge(&mut self, collection: &str, id: &str, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            merge: true,
        });
        self
    }

    pub fn update(&mut self, collection: &str, id: &str, updates: FieldUpdates) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            updates,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// What a watch observes.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchTarget {
    Query(Query),
    /// A single document; snapshots hold zero or one document.
    Document { collection: String, id: String },
}

impl WatchTarget {
    pub fn document(collection: &str, id: &str) -> Self {
        WatchTarget::Document {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            WatchTarget::Query(query) => &query.collection,
            WatchTarget::Document { collection, .. } => collection,
        }
    }
}

/// Full result set delivered by a watch. An `Err` is the last item.
pub type Snapshot = Result<Vec<Document>, StoreError>;

/// Live stream of snapshots. Dropping it stops the underlying listener.
#[derive(Debug)]
pub struct Watch {
    snapshots: mpsc::UnboundedReceiver<Snapshot>,
    _guard: DropGuard,
}

impl Watch {
    pub fn new(snapshots: mpsc::UnboundedReceiver<Snapshot>, token: CancellationToken) -> Self {
        Self {
            snapshots,
            _guard: token.drop_guard(),
        }
    }

    /// Next snapshot, or `None` once the listener has stopped.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }
}

/// Client contract of the document store.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Creates a document with a store-assigned id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Applies every op of the batch or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Starts a watch. The first snapshot is delivered immediately.
    async fn watch(&self, target: WatchTarget) -> Result<Watch, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        if merge {
            batch.set_merge(collection, id, fields);
        } else {
            batch.set(collection, id, fields);
        }
        self.commit(batch).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, updates);
        self.commit(batch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch).await
    }
}

/// Shared handle passed to every repository.
pub type SharedStore = Arc<dyn DocumentStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[test]
    fn test_filter_matches() {
        let doc = Document::from_value("a", json!({"circleIds": ["g1", "g2"], "circleId": "g3"}));
        assert!(Filter::ArrayContains {
            field: "circleIds".into(),
            value: json!("g2")
        }
        .matches(&doc));
        assert!(Filter::Eq {
            field: "circleId".into(),
            value: json!("g3")
        }
        .matches(&doc));
        assert!(!Filter::ArrayContains {
            field: "circleId".into(),
            value: json!("g3")
        }
        .matches(&doc));
    }

    #[test]
    fn test_filter_equality_is_typed() {
        let doc = Document::from_value("a", json!({"code": 42, "tags": [1, "2"], "ratio": 1.0}));
        let eq = |field: &str, value: Value| {
            Filter::Eq {
                field: field.into(),
                value,
            }
            .matches(&doc)
        };
        assert!(eq("code", json!(42)));
        assert!(!eq("code", json!("42")));
        assert!(eq("ratio", json!(1)));
        assert!(!eq("missing", Value::Null));

        let contains = |value: Value| {
            Filter::ArrayContains {
                field: "tags".into(),
                value,
            }
            .matches(&doc)
        };
        assert!(contains(json!(1.0)));
        assert!(!contains(json!("1")));
        assert!(contains(json!("2")));
        assert!(!contains(json!(2)));
    }

    #[test]
    fn test_ordered_query_requires_order_field() {
        let query = Query::collection("alertasCirculos")
            .where_eq("circleId", "g1")
            .order_by_desc("timestamp");
        let without = Document::from_value("a", json!({"circleId": "g1"}));
        let with = Document::from_value("b", json!({"circleId": "g1", "timestamp": 1}));
        assert!(!query.matches(&without));
        assert!(query.matches(&with));
        assert!(query.unordered().matches(&without));
        assert_eq!(
            query.describe(),
            "alertasCirculos:circleId==:desc(timestamp)"
        );
    }

    #[test]
    fn test_field_updates_apply() {
        let mut doc = fields(json!({"members": ["a"], "pending": ["b", "c"], "x": 1}));
        FieldUpdates::new()
            .array_union("members", vec![json!("a"), json!("b")])
            .array_remove("pending", vec![json!("b")])
            .array_union("fresh", vec![json!(1)])
            .delete("x")
            .set("name", "G")
            .apply(&mut doc);
        assert_eq!(doc["members"], json!(["a", "b"]));
        assert_eq!(doc["pending"], json!(["c"]));
        assert_eq!(doc["fresh"], json!([1]));
        assert_eq!(doc["name"], json!("G"));
        assert!(!doc.contains_key("x"));
    }

    #[test]
    fn test_write_op_apply() {
        let existing = Some(fields(json!({"a": 1, "b": 2})));
        let merge = WriteOp::Set {
            collection: "c".into(),
            id: "1".into(),
            fields: fields(json!({"b": 3})),
            merge: true,
        };
        assert_eq!(
            merge.apply(existing.clone()).unwrap(),
            Some(fields(json!({"a": 1, "b": 3})))
        );

        let replace = WriteOp::Set {
            collection: "c".into(),
            id: "1".into(),
            fields: fields(json!({"b": 3})),
            merge: false,
        };
        assert_eq!(
            replace.apply(existing).unwrap(),
            Some(fields(json!({"b": 3})))
        );

        let update = WriteOp::Update {
            collection: "c".into(),
            id: "1".into(),
            updates: FieldUpdates::new().set("a", 1),
        };
        assert_eq!(
            update.apply(None),
            Err(StoreError::not_found("c", "1"))
        );
    }
}
