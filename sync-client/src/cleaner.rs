//! Retention cleaner: permanent removal of old tombstones.
//!
//! Purges remote tombstones first, then local ones. A pull that runs in
//! between cannot bring a purged record back: expired tombstones without a
//! local row are not reinserted.

use std::sync::Arc;

use casesync_core::retention_cutoff;
use casesync_types::{EntityType, Timestamp};
use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::local::LocalStore;
use crate::remote::RemoteStore;
use crate::stop::StopSignal;

/// Cleaner settings.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    /// Tombstones deleted longer ago than this are purged.
    pub retention_days: u32,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

/// Totals of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Cutoff used.
    pub cutoff: Timestamp,
    /// Remote documents removed.
    pub remote_purged: u64,
    /// Local rows removed.
    pub local_purged: u64,
    /// The run was stopped before the local phase.
    pub cancelled: bool,
}

/// Purges tombstones past the retention window.
#[derive(Clone)]
pub struct RetentionCleaner {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    config: CleanerConfig,
}

impl RetentionCleaner {
    /// Create a cleaner.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        config: CleanerConfig,
    ) -> Self {
        Self {
            local,
            remote,
            clock,
            config,
        }
    }

    /// Use a different retention window.
    pub fn with_retention_days(mut self, retention_days: u32) -> Self {
        self.config.retention_days = retention_days;
        self
    }

    /// Purge expired tombstones of one entity type.
    pub async fn run(&self, entity: EntityType, stop: &StopSignal) -> Result<CleanupReport, PipelineError> {
        let cutoff = retention_cutoff(self.clock.now(), self.config.retention_days);
        let page = self.remote.batch_ceiling().max(1);
        let mut report = CleanupReport {
            cutoff,
            ..Default::default()
        };

        loop {
            if stop.is_stopped() {
                report.cancelled = true;
                return Ok(report);
            }
            let ids = self
                .remote
                .query_tombstones_before(entity, cutoff, page)
                .await?;
            if ids.is_empty() {
                break;
            }
            let purged = self.remote.delete_hard(entity, &ids).await?;
            report.remote_purged += purged;
            if ids.len() < page || purged == 0 {
                break;
            }
        }

        report.local_purged = self.local.delete_hard_before(entity, cutoff).await?;

        info!(
            %entity,
            cutoff = %cutoff,
            remote = report.remote_purged,
            local = report.local_purged,
            "tombstones purged"
        );
        Ok(report)
    }

    /// Purge every entity type.
    pub async fn run_all(&self, stop: &StopSignal) -> Result<Vec<(EntityType, CleanupReport)>, PipelineError> {
        let mut reports = Vec::with_capacity(EntityType::ALL.len());
        for entity in EntityType::ALL {
            if stop.is_stopped() {
                break;
            }
            reports.push((entity, self.run(entity, stop).await?));
        }
        Ok(reports)
    }
}
