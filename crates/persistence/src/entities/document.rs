//! Document entity (database row mapping).

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::{Document, Fields};
use sqlx::types::Json;
use sqlx::FromRow;

/// Database row mapping for the documents table.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentEntity {
    pub collection: String,
    pub id: String,
    pub data: Json<Value>,
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentEntity> for Document {
    fn from(entity: DocumentEntity) -> Self {
        Document::from_value(entity.id, entity.data.0)
    }
}

/// Serializes a field map for the `data` column.
pub fn to_data(fields: Fields) -> Json<Value> {
    Json(Value::Object(fields))
}
