//! Store metrics collection.
//!
//! Provides functions for recording store, fallback and sweep metrics.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Record store query duration.
pub fn record_query_duration(query_name: &str, duration_secs: f64) {
    histogram!(
        "store_query_duration_seconds",
        "query" => query_name.to_string()
    )
    .record(duration_secs);
}

/// Record PostgreSQL connection pool metrics.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("store_connections_active").set(active as f64);
    gauge!("store_connections_idle").set(idle as f64);
    gauge!("store_connections_total").set(size as f64);
}

/// Record one attempt of a fallback chain and how it ended.
pub fn record_fallback_attempt(chain: &str, outcome: &'static str) {
    counter!(
        "fallback_attempts_total",
        "chain" => chain.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a fallback chain where no attempt produced results.
pub fn record_fallback_exhausted(chain: &str) {
    counter!("fallback_exhausted_total", "chain" => chain.to_string()).increment(1);
}

/// Record the outcome counters of a maintenance sweep.
pub fn record_sweep(sweep: &'static str, updated: usize, errors: usize) {
    counter!("sweep_runs_total", "sweep" => sweep).increment(1);
    counter!("sweep_updated_total", "sweep" => sweep).increment(updated as u64);
    counter!("sweep_errors_total", "sweep" => sweep).increment(errors as u64);
}

/// A helper to time store operations and record metrics.
///
/// Usage:
/// ```ignore
/// let timer = QueryTimer::new(query.describe());
/// let result = store.query(&query).await;
/// timer.record();
/// result
/// ```
pub struct QueryTimer {
    query_name: String,
    start: Instant,
}

impl QueryTimer {
    /// Create a new timer for the given query name.
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration to metrics.
    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_query_duration(&self.query_name, duration);
    }
}
