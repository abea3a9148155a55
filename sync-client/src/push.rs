//! Push pipeline: local dirty records to the remote store.
//!
//! One batch is:
//! 1. load up to `batch_size` dirty records
//! 2. pre-check each against the remote (outside the atomic batch)
//! 3. plan writes with a single shared "now"
//! 4. submit the writes as one atomic batch
//! 5. mark the committed records clean, unless edited since step 1
//!
//! Any failure before the commit leaves every record dirty. A rejected
//! batch is retried one op at a time to isolate poison records, which are
//! quarantined after `max_push_failures` consecutive rejections.

use std::collections::HashMap;
use std::sync::Arc;

use casesync_core::{plan_batch, BatchPlan, PushDecision};
use casesync_types::{EntityType, RecordId, Timestamp, WriteOp};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{PipelineError, RemoteError};
use crate::local::{LocalStore, PushedRecord};
use crate::remote::RemoteStore;
use crate::stop::StopSignal;

/// Push pipeline settings.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Records per batch. Must not exceed the remote batch ceiling.
    pub batch_size: usize,
    /// Upper bound on batches in one run.
    pub max_batches_per_run: u32,
    /// Consecutive rejections before a record is quarantined.
    pub max_push_failures: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            batch_size: 450,
            max_batches_per_run: 20,
            max_push_failures: 5,
        }
    }
}

/// Outcome of one push batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Dirty records loaded.
    pub loaded: usize,
    /// Records written remotely and marked clean.
    pub written: usize,
    /// Records already present remotely, marked clean without a write.
    pub confirmed: usize,
    /// Records where the remote copy won; still dirty.
    pub superseded: usize,
    /// Writes rejected during isolation; still dirty.
    pub rejected: usize,
    /// Records quarantined by this batch.
    pub quarantined: usize,
}

impl BatchOutcome {
    /// Whether the batch changed what the next load returns.
    pub fn made_progress(&self) -> bool {
        self.written + self.confirmed + self.quarantined > 0
    }
}

/// Totals of one push run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    /// Batches attempted.
    pub batches: u32,
    /// Records written.
    pub written: usize,
    /// Records confirmed without a write.
    pub confirmed: usize,
    /// Records superseded by the remote copy.
    pub superseded: usize,
    /// Writes rejected.
    pub rejected: usize,
    /// Records quarantined.
    pub quarantined: usize,
    /// The run was stopped early.
    pub cancelled: bool,
}

impl PushReport {
    fn absorb(&mut self, batch: &BatchOutcome) {
        self.batches += 1;
        self.written += batch.written;
        self.confirmed += batch.confirmed;
        self.superseded += batch.superseded;
        self.rejected += batch.rejected;
        self.quarantined += batch.quarantined;
    }
}

/// Drains dirty records of one entity type to the remote store.
#[derive(Clone)]
pub struct PushPipeline {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    config: PushConfig,
}

impl PushPipeline {
    /// Create a push pipeline.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        config: PushConfig,
    ) -> Self {
        Self {
            local,
            remote,
            clock,
            config,
        }
    }

    /// Push batches until the dirty set is drained.
    ///
    /// Also stops when a batch makes no progress, the batch limit is hit,
    /// or `stop` fires between batches.
    pub async fn run(&self, entity: EntityType, stop: &StopSignal) -> Result<PushReport, PipelineError> {
        let mut report = PushReport::default();

        loop {
            if stop.is_stopped() {
                report.cancelled = true;
                break;
            }
            if report.batches >= self.config.max_batches_per_run {
                info!(%entity, batches = report.batches, "push batch limit reached");
                break;
            }

            let batch = self.push_batch(entity).await?;
            if batch.loaded == 0 {
                break;
            }
            report.absorb(&batch);

            if batch.loaded < self.config.batch_size || !batch.made_progress() {
                break;
            }
        }

        info!(
            %entity,
            batches = report.batches,
            written = report.written,
            confirmed = report.confirmed,
            superseded = report.superseded,
            quarantined = report.quarantined,
            "push run finished"
        );
        Ok(report)
    }

    /// Push one batch.
    pub async fn push_batch(&self, entity: EntityType) -> Result<BatchOutcome, PipelineError> {
        let records = self
            .local
            .load_dirty_batch(entity, self.config.batch_size)
            .await?;
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut existing = HashMap::with_capacity(records.len());
        for record in &records {
            // A failed read aborts the batch: existence is unknown.
            if let Some(doc) = self.remote.get(entity, &record.id).await? {
                existing.insert(record.id.clone(), doc);
            }
        }

        let loaded: HashMap<RecordId, Timestamp> = records
            .iter()
            .map(|record| (record.id.clone(), record.updated_at))
            .collect();
        let now = self.clock.now();
        let plan = plan_batch(&records, &existing, now);
        for planned in &plan.records {
            debug!(%entity, id = %planned.id, decision = decision_name(&planned.decision), "planned");
        }

        let mut outcome = BatchOutcome {
            loaded: records.len(),
            superseded: plan.superseded().len(),
            ..Default::default()
        };
        if outcome.superseded > 0 {
            info!(%entity, superseded = outcome.superseded, "remote copies won; pull required");
        }

        let writes = plan.writes();
        if writes.is_empty() {
            outcome.confirmed = self.mark_clean(entity, &plan, &loaded, None).await?;
            return Ok(outcome);
        }

        match self.remote.batch_write(entity, &writes).await {
            Ok(()) => {
                let cleaned = self.mark_clean(entity, &plan, &loaded, None).await?;
                outcome.written = writes.len();
                outcome.confirmed = cleaned - writes.len();
                info!(%entity, written = outcome.written, confirmed = outcome.confirmed, "batch committed");
                Ok(outcome)
            }
            Err(RemoteError::Rejected { reason }) => {
                warn!(%entity, ops = writes.len(), %reason, "batch rejected; isolating writes");
                self.isolate(entity, &plan, &loaded, writes, outcome).await
            }
            Err(e) => {
                if e.is_transient() {
                    info!(%entity, error = %e, "batch write failed; records stay dirty");
                } else {
                    warn!(%entity, error = %e, "batch write failed; records stay dirty");
                }
                Err(e.into())
            }
        }
    }

    /// Retry each write of a rejected batch on its own.
    async fn isolate(
        &self,
        entity: EntityType,
        plan: &BatchPlan,
        loaded: &HashMap<RecordId, Timestamp>,
        writes: Vec<WriteOp>,
        mut outcome: BatchOutcome,
    ) -> Result<BatchOutcome, PipelineError> {
        let mut accepted: Vec<RecordId> = Vec::new();
        let mut last_reason = String::new();

        for op in writes {
            match self.remote.batch_write(entity, std::slice::from_ref(&op)).await {
                Ok(()) => accepted.push(op.id().clone()),
                Err(RemoteError::Rejected { reason }) => {
                    outcome.rejected += 1;
                    let quarantined = self
                        .local
                        .record_push_failure(
                            entity,
                            op.id(),
                            &reason,
                            self.config.max_push_failures,
                            self.clock.now(),
                        )
                        .await?;
                    if quarantined {
                        outcome.quarantined += 1;
                        warn!(%entity, id = %op.id(), %reason, "record quarantined");
                    } else {
                        debug!(%entity, id = %op.id(), %reason, "write rejected");
                    }
                    last_reason = reason;
                }
                Err(e) => {
                    // Mark what already committed before giving up.
                    outcome.written = accepted.len();
                    self.mark_clean(entity, plan, loaded, Some(&accepted)).await?;
                    return Err(e.into());
                }
            }
        }

        outcome.written = accepted.len();
        let cleaned = self.mark_clean(entity, plan, loaded, Some(&accepted)).await?;
        outcome.confirmed = cleaned - accepted.len();

        if outcome.written == 0 && outcome.quarantined == 0 {
            return Err(RemoteError::Rejected {
                reason: last_reason,
            }
            .into());
        }
        Ok(outcome)
    }

    /// Mark committed and confirmed records clean. With `only`, writes
    /// outside that list stay dirty. Records edited since `loaded` stay
    /// dirty too. Returns how many records the batch settled remotely.
    async fn mark_clean(
        &self,
        entity: EntityType,
        plan: &BatchPlan,
        loaded: &HashMap<RecordId, Timestamp>,
        only: Option<&[RecordId]>,
    ) -> Result<usize, PipelineError> {
        let mut settled = 0;
        for ((version, pushed_at), ids) in plan.clean_groups() {
            let pushed: Vec<PushedRecord> = ids
                .into_iter()
                .filter(|id| match only {
                    Some(accepted) => accepted.contains(id) || is_confirmed(plan, id),
                    None => true,
                })
                .filter_map(|id| {
                    loaded
                        .get(&id)
                        .map(|loaded_at| PushedRecord { id, loaded_at: *loaded_at })
                })
                .collect();
            if pushed.is_empty() {
                continue;
            }
            let cleaned = self
                .local
                .mark_batch_pushed(entity, &pushed, version, pushed_at)
                .await?;
            if cleaned < pushed.len() as u64 {
                debug!(
                    %entity,
                    edited = pushed.len() as u64 - cleaned,
                    "records edited during push stay dirty"
                );
            }
            settled += pushed.len();
        }
        Ok(settled)
    }
}

fn is_confirmed(plan: &BatchPlan, id: &RecordId) -> bool {
    plan.records
        .iter()
        .any(|planned| &planned.id == id && matches!(planned.decision, PushDecision::Confirmed { .. }))
}

fn decision_name(decision: &PushDecision) -> &'static str {
    match decision {
        PushDecision::Create(_) => "create",
        PushDecision::Update(_) => "update",
        PushDecision::Confirmed { .. } => "confirmed",
        PushDecision::Superseded { .. } => "superseded",
    }
}
