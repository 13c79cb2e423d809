//! PostgreSQL JSONB document store.
//!
//! Documents live in a single `documents` table keyed by (collection, id).
//! Filters compile to JSONB operators with field names bound as parameters.
//! Watches re-run their target whenever a `document_changes` notification
//! names the watched collection.

use async_trait::async_trait;
use serde_json::Value;
use shared::codes::generate_document_id;
use shared::{Document, Fields};
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    DocumentStore, Filter, Query, Snapshot, StoreError, Watch, WatchTarget, WriteBatch,
};
use crate::entities::document::{to_data, DocumentEntity};
use crate::metrics::QueryTimer;

/// Notification channel fed by the `documents_notify` trigger.
pub const CHANGE_CHANNEL: &str = "document_changes";

const SELECT_COLUMNS: &str = "SELECT collection, id, data, updated_at FROM documents";

enum Bind {
    Text(String),
    Json(Value),
    Int(i64),
}

/// Compiles a query to SQL plus its ordered bind values.
fn compile(query: &Query) -> (String, Vec<Bind>) {
    let mut sql = format!("{} WHERE collection = $1", SELECT_COLUMNS);
    let mut binds = vec![Bind::Text(query.collection.clone())];

    for filter in &query.filters {
        let field_idx = binds.len() + 1;
        let value_idx = field_idx + 1;
        match filter {
            Filter::Eq { field, value } => {
                sql.push_str(&format!(" AND data -> ${} = ${}", field_idx, value_idx));
                binds.push(Bind::Text(field.clone()));
                binds.push(Bind::Json(value.clone()));
            }
            Filter::ArrayContains { field, value } => {
                sql.push_str(&format!(
                    " AND jsonb_typeof(data -> ${f}) = 'array' AND data -> ${f} @> ${v}",
                    f = field_idx,
                    v = value_idx
                ));
                binds.push(Bind::Text(field.clone()));
                binds.push(Bind::Json(Value::Array(vec![value.clone()])));
            }
        }
    }

    if let Some(field) = &query.order_by_desc {
        let idx = binds.len() + 1;
        // jsonb orders {seconds, nanoseconds} objects by seconds first.
        sql.push_str(&format!(
            " AND data -> ${i} IS NOT NULL AND data -> ${i} <> 'null'::jsonb ORDER BY data -> ${i} DESC, id",
            i = idx
        ));
        binds.push(Bind::Text(field.clone()));
    } else {
        sql.push_str(" ORDER BY id");
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT ${}", binds.len() + 1));
        binds.push(Bind::Int(limit as i64));
    }

    (sql, binds)
}

/// Document store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let (sql, binds) = compile(query);
        let mut q = sqlx::query_as::<_, DocumentEntity>(&sql);
        for bind in binds {
            q = match bind {
                Bind::Text(text) => q.bind(text),
                Bind::Json(value) => q.bind(Json(value)),
                Bind::Int(n) => q.bind(n),
            };
        }

        let timer = QueryTimer::new(query.describe());
        let rows = q.fetch_all(&self.pool).await;
        timer.record();

        Ok(rows?.into_iter().map(Document::from).collect())
    }

    async fn snapshot(&self, target: &WatchTarget) -> Snapshot {
        match target {
            WatchTarget::Query(query) => self.run(query).await,
            WatchTarget::Document { collection, id } => Ok(self
                .get(collection, id)
                .await?
                .into_iter()
                .collect()),
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let timer = QueryTimer::new(format!("{}:id", collection));
        let row = sqlx::query_as::<_, DocumentEntity>(&format!(
            "{} WHERE collection = $1 AND id = $2",
            SELECT_COLUMNS
        ))
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(row?.map(Document::from))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.run(query).await
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = generate_document_id();
        sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(to_data(fields))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let timer = QueryTimer::new("commit");
        let mut tx = self.pool.begin().await?;

        let mut staged: BTreeMap<(String, String), Option<Fields>> = BTreeMap::new();
        for op in batch.ops() {
            let key = (op.collection().to_string(), op.id().to_string());
            let current = match staged.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    let row: Option<(Json<Value>,)> = sqlx::query_as(
                        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
                    )
                    .bind(op.collection())
                    .bind(op.id())
                    .fetch_optional(&mut *tx)
                    .await?;
                    row.map(|(data,)| Document::from_value(op.id(), data.0).fields)
                }
            };
            staged.insert(key, op.apply(current)?);
        }

        for ((collection, id), next) in staged {
            match next {
                Some(fields) => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (collection, id)
                        DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
                        "#,
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(to_data(fields))
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(&collection)
                        .bind(&id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        timer.record();
        Ok(())
    }

    async fn watch(&self, target: WatchTarget) -> Result<Watch, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let first = self.snapshot(&target).await;
        let failed = first.is_err();
        let _ = tx.send(first);
        if failed {
            return Ok(Watch::new(rx, token));
        }

        let store = self.clone();
        let cancelled = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    notification = listener.recv() => match notification {
                        Ok(n) if n.payload() == target.collection() => {
                            let snapshot = store.snapshot(&target).await;
                            let failed = snapshot.is_err();
                            if tx.send(snapshot).is_err() || failed {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(error = %e, collection = target.collection(), "Watch listener failed");
                            let _ = tx.send(Err(StoreError::from(e)));
                            break;
                        }
                    },
                }
            }
            debug!(collection = target.collection(), "Watch stopped");
        });

        Ok(Watch::new(rx, token))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
