//! Background maintenance jobs.

mod backfill_groups;
mod location_maintenance;
mod pool_metrics;
mod scheduler;

pub use backfill_groups::BackfillGroupsJob;
pub use location_maintenance::LocationMaintenanceJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
