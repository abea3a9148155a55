//! Pull pipeline: remote truth into the local store.
//!
//! Pages through remote documents oldest change first, starting after the
//! persisted cursor. Each page is applied and then the cursor is saved, so
//! a stopped or crashed run resumes where it left off.
//!
//! Pulled records are written clean, except where a dirty local copy wins
//! the conflict rule: that local intent is kept for the next push.

use std::sync::Arc;

use casesync_core::retention::{retention_cutoff, skip_on_pull};
use casesync_core::{pick_winner, PullTracker, StopReason, Winner};
use casesync_types::{EntityType, PullCursor, RecordId, RemoteDocument, SyncedRecord, Timestamp};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::local::{LocalStore, RowState};
use crate::remote::RemoteStore;
use crate::stop::StopSignal;

/// Pull pipeline settings.
#[derive(Debug, Clone)]
pub struct PullConfig {
    /// Records per page.
    pub page_size: usize,
    /// Pages per run before deferring to the next run.
    pub max_pages: u32,
    /// Tombstone retention window, used to avoid reinserting purged records.
    pub retention_days: u32,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            max_pages: 50,
            retention_days: 30,
        }
    }
}

/// Attempts at applying one page while local rows keep changing under it.
const MAX_APPLY_ROUNDS: usize = 3;

/// Totals of one pull run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// Pages requested.
    pub pages: u32,
    /// Documents received.
    pub received: usize,
    /// Records written locally.
    pub applied: usize,
    /// Dirty local records kept because they win.
    pub kept_local: usize,
    /// Expired tombstones not inserted.
    pub skipped_expired: usize,
    /// Why the run stopped; `None` if it was cancelled.
    #[serde(skip)]
    pub stop_reason: Option<StopReason>,
    /// Cursor after the run.
    pub cursor: Option<PullCursor>,
}

/// Outcome of applying one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PageOutcome {
    applied: usize,
    kept_local: usize,
    skipped_expired: usize,
}

/// Hydrates the local store with remote documents of one entity type.
#[derive(Clone)]
pub struct PullPipeline {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    config: PullConfig,
}

impl PullPipeline {
    /// Create a pull pipeline.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        config: PullConfig,
    ) -> Self {
        Self {
            local,
            remote,
            clock,
            config,
        }
    }

    /// Pull pages until a short or empty page, the page limit, or `stop`.
    pub async fn run(&self, entity: EntityType, stop: &StopSignal) -> Result<PullReport, PipelineError> {
        let cursor = self.local.load_pull_cursor(entity).await?;
        let mut tracker = PullTracker::new(cursor, self.config.page_size, self.config.max_pages);
        let cutoff = retention_cutoff(self.clock.now(), self.config.retention_days);
        let mut report = PullReport::default();

        while let Some(request) = tracker.next_request() {
            if stop.is_stopped() {
                break;
            }

            let page = self
                .remote
                .query_page(entity, request.after.as_ref(), request.limit)
                .await?;
            let len = page.len();
            let last = page
                .last()
                .map(|doc| PullCursor::new(doc.updated_at, doc.id.clone()));

            let applied = self.apply_page(entity, page, cutoff).await?;
            report.applied += applied.applied;
            report.kept_local += applied.kept_local;
            report.skipped_expired += applied.skipped_expired;

            tracker.record_page(len, last);
            if len > 0 {
                if let Some(cursor) = tracker.cursor() {
                    self.local.save_pull_cursor(entity, cursor).await?;
                }
            }
            debug!(%entity, page = tracker.pages_fetched(), records = len, "page applied");
        }

        report.pages = tracker.pages_fetched();
        report.received = usize::try_from(tracker.records_seen()).unwrap_or(usize::MAX);
        report.stop_reason = tracker.stop_reason();
        report.cursor = tracker.cursor().cloned();

        info!(
            %entity,
            pages = report.pages,
            received = report.received,
            applied = report.applied,
            kept_local = report.kept_local,
            stop = ?report.stop_reason,
            "pull run finished"
        );
        Ok(report)
    }

    /// Apply one page of remote documents.
    ///
    /// Each write is guarded on the local row staying as it was read. A
    /// row that changed in between, typically through a local edit, is
    /// read again and resolved anew.
    async fn apply_page(
        &self,
        entity: EntityType,
        page: Vec<RemoteDocument>,
        cutoff: Timestamp,
    ) -> Result<PageOutcome, PipelineError> {
        let mut outcome = PageOutcome::default();
        let mut pending = page;

        for _ in 0..MAX_APPLY_ROUNDS {
            if pending.is_empty() {
                return Ok(outcome);
            }

            let ids: Vec<RecordId> = pending.iter().map(|doc| doc.id.clone()).collect();
            let existing = self.local.find(entity, &ids).await?;

            let mut writes: Vec<(SyncedRecord, RowState)> = Vec::with_capacity(pending.len());
            for doc in &pending {
                let local = existing.get(&doc.id);

                if skip_on_pull(doc, local.is_some(), cutoff) {
                    debug!(%entity, id = %doc.id, "expired tombstone not reinserted");
                    outcome.skipped_expired += 1;
                    continue;
                }

                let incoming = doc.to_clean_record();
                if let Some(local) = local.filter(|local| local.is_dirty) {
                    if pick_winner(local, Some(&incoming)) == Winner::Local {
                        debug!(%entity, id = %local.id, "dirty local copy wins; kept");
                        outcome.kept_local += 1;
                        continue;
                    }
                }
                writes.push((incoming, RowState::of(local)));
            }

            let changed = self.local.apply_pulled(entity, &writes).await?;
            outcome.applied += writes.len() - changed.len();
            if !changed.is_empty() {
                debug!(%entity, changed = changed.len(), "local rows changed during apply; resolving again");
            }
            pending.retain(|doc| changed.contains(&doc.id));
        }

        if !pending.is_empty() {
            // Still moving; those rows are dirty and the next push resolves them.
            debug!(%entity, rows = pending.len(), "left to the local writer");
            outcome.kept_local += pending.len();
        }
        Ok(outcome)
    }
}
