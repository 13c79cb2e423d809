//! Maintenance worker for the circles sync core: background sweeps plus a
//! health and metrics endpoints.

pub mod app;
pub mod config;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod routes;

use anyhow::Result;
use domain::services::PrecisionPolicy;
use persistence::db::connect_store;
use persistence::{CirclesContext, MemoryStore, SharedStore};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, StoreBackend};
use crate::jobs::{BackfillGroupsJob, JobScheduler, LocationMaintenanceJob, PoolMetricsJob};

/// Context plus the jobs that belong to the configured backend.
pub struct Runtime {
    pub ctx: CirclesContext,
    pub scheduler: JobScheduler,
}

/// Opens the configured store and registers the maintenance jobs.
pub async fn build_runtime(config: &Config) -> Result<Runtime> {
    let mut scheduler = JobScheduler::new();

    let store: SharedStore = match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory document store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            let store = connect_store(&config.store.pool()).await?;
            scheduler.register(PoolMetricsJob::new(store.clone()));
            Arc::new(store)
        }
    };

    let policy: PrecisionPolicy = config.sync.precision();
    let ctx = CirclesContext::new(store, policy).with_debounce(config.sync.debounce());

    if config.jobs.enabled {
        scheduler.register(BackfillGroupsJob::new(
            ctx.groups().clone(),
            config.jobs.backfill_interval_minutes,
        ));
        scheduler.register(LocationMaintenanceJob::new(
            ctx.users().clone(),
            ctx.locations().clone(),
            config.sync.inactive_after(),
            config.jobs.location_interval_minutes,
        ));
    }
    info!(jobs = ?scheduler.job_names(), "Runtime ready");

    Ok(Runtime { ctx, scheduler })
}
