//! Periodic dual-shape group backfill.

use persistence::repositories::GroupRepository;
use tracing::{info, warn};

use super::scheduler::{Job, JobFrequency};

/// Writes the missing member shape into every single-shape group.
pub struct BackfillGroupsJob {
    groups: GroupRepository,
    interval_minutes: u64,
}

impl BackfillGroupsJob {
    pub fn new(groups: GroupRepository, interval_minutes: u64) -> Self {
        Self {
            groups,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for BackfillGroupsJob {
    fn name(&self) -> &'static str {
        "backfill_groups"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .groups
            .backfill_all()
            .await
            .map_err(|e| format!("Failed to list groups: {}", e))?;

        if report.errors > 0 {
            warn!(
                errors = report.errors,
                failures = ?report.failures,
                "Some groups could not be backfilled"
            );
        }
        info!(
            processed = report.processed,
            updated = report.updated,
            "Group backfill finished"
        );
        Ok(())
    }
}
