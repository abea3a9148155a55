//! SyncEngine - the main interface for casesync.
//!
//! Bundles one local store, one remote store and a clock with the three
//! pipelines, and adds the multi-entity runs the scheduler dispatches.
//!
//! ```text
//! Scheduler → SyncEngine → PushPipeline / PullPipeline / RetentionCleaner
//!                 ↓                         ↓
//!            LocalStore                RemoteStore
//! ```
//!
//! # Example
//!
//! ```ignore
//! use casesync_client::{EngineConfig, MemoryRemoteStore, SqliteLocalStore, SyncEngine, SystemClock};
//!
//! let local = SqliteLocalStore::new("casesync.db".as_ref()).await?;
//! let engine = SyncEngine::new(
//!     Arc::new(local),
//!     Arc::new(MemoryRemoteStore::new()),
//!     Arc::new(SystemClock),
//!     EngineConfig::default(),
//! );
//!
//! engine.sync_all(&StopSignal::new()).await?;
//! ```

use std::sync::Arc;

use casesync_types::EntityType;
use serde::Serialize;
use tracing::info;

use crate::cleaner::{CleanerConfig, CleanupReport, RetentionCleaner};
use crate::clock::Clock;
use crate::error::PipelineError;
use crate::local::LocalStore;
use crate::pull::{PullConfig, PullPipeline, PullReport};
use crate::push::{PushConfig, PushPipeline, PushReport};
use crate::remote::RemoteStore;
use crate::stop::StopSignal;

/// Settings for all three pipelines.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Push settings.
    pub push: PushConfig,
    /// Pull settings.
    pub pull: PullConfig,
    /// Cleaner settings.
    pub cleaner: CleanerConfig,
}

/// Report of a multi-entity run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Push reports, in run order.
    pub pushed: Vec<(EntityType, PushReport)>,
    /// Pull reports, in run order.
    pub pulled: Vec<(EntityType, PullReport)>,
}

/// One device's sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    push: PushPipeline,
    pull: PullPipeline,
    cleaner: RetentionCleaner,
}

impl SyncEngine {
    /// Create an engine over the given stores.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let push = PushPipeline::new(local.clone(), remote.clone(), clock.clone(), config.push);
        let pull = PullPipeline::new(local.clone(), remote.clone(), clock.clone(), config.pull);
        let cleaner = RetentionCleaner::new(local.clone(), remote.clone(), clock, config.cleaner);
        Self {
            local,
            remote,
            push,
            pull,
            cleaner,
        }
    }

    /// The local store.
    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    /// The remote store.
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Push dirty records of one entity type.
    pub async fn push(&self, entity: EntityType, stop: &StopSignal) -> Result<PushReport, PipelineError> {
        self.push.run(entity, stop).await
    }

    /// Pull remote changes of one entity type.
    pub async fn pull(&self, entity: EntityType, stop: &StopSignal) -> Result<PullReport, PipelineError> {
        self.pull.run(entity, stop).await
    }

    /// Push then pull one entity type.
    pub async fn sync(&self, entity: EntityType, stop: &StopSignal) -> Result<SyncReport, PipelineError> {
        let mut report = SyncReport::default();
        report.pushed.push((entity, self.push(entity, stop).await?));
        if !stop.is_stopped() {
            report.pulled.push((entity, self.pull(entity, stop).await?));
        }
        Ok(report)
    }

    /// Push every entity type.
    ///
    /// Every entity type is attempted; the first error is returned after
    /// the others have run.
    pub async fn push_all(&self, stop: &StopSignal) -> Result<Vec<(EntityType, PushReport)>, PipelineError> {
        let mut reports = Vec::new();
        let mut first_error = None;
        for entity in EntityType::ALL {
            if stop.is_stopped() {
                break;
            }
            match self.push(entity, stop).await {
                Ok(report) => reports.push((entity, report)),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    /// Pull every entity type.
    pub async fn pull_all(&self, stop: &StopSignal) -> Result<Vec<(EntityType, PullReport)>, PipelineError> {
        let mut reports = Vec::new();
        let mut first_error = None;
        for entity in EntityType::ALL {
            if stop.is_stopped() {
                break;
            }
            match self.pull(entity, stop).await {
                Ok(report) => reports.push((entity, report)),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    /// Push every entity type, then pull every entity type.
    ///
    /// Pulls still run when a push failed, so remote changes arrive even
    /// while one collection is stuck. The first error is returned.
    pub async fn sync_all(&self, stop: &StopSignal) -> Result<SyncReport, PipelineError> {
        let pushed = self.push_all(stop).await;
        let pulled = self.pull_all(stop).await;
        let report = SyncReport {
            pushed: pushed?,
            pulled: pulled?,
        };
        info!(
            pushed = report.pushed.len(),
            pulled = report.pulled.len(),
            "coordinated sync finished"
        );
        Ok(report)
    }

    /// Purge tombstones older than `retention_days` from every entity type.
    pub async fn cleanup(
        &self,
        retention_days: u32,
        stop: &StopSignal,
    ) -> Result<Vec<(EntityType, CleanupReport)>, PipelineError> {
        self.cleaner
            .clone()
            .with_retention_days(retention_days)
            .run_all(stop)
            .await
    }
}
