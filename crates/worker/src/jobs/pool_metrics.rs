//! Connection pool gauges for the PostgreSQL backend.

use persistence::PgDocumentStore;

use super::scheduler::{Job, JobFrequency};

pub struct PoolMetricsJob {
    store: PgDocumentStore,
}

impl PoolMetricsJob {
    pub fn new(store: PgDocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(10)
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(self.store.pool());
        Ok(())
    }
}
