//! Pull pagination tracking.
//!
//! Remote records are read in pages ordered ascending by
//! `(updated_at, id)`, each page starting strictly after the cursor. The
//! tracker decides when a run stops:
//! - an empty page
//! - a page shorter than the page size
//! - the maximum page count (the rest waits for the next run)

use casesync_types::PullCursor;

/// Parameters of the next page query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Return records strictly after this key, or from the start.
    pub after: Option<PullCursor>,
    /// Maximum records to return.
    pub limit: usize,
}

/// Why a pull run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The remote returned no records.
    EmptyPage,
    /// The remote returned fewer records than requested.
    ShortPage,
    /// The page limit for one run was reached.
    MaxPages,
}

/// Tracks the cursor and page count of one pull run.
#[derive(Debug, Clone)]
pub struct PullTracker {
    cursor: Option<PullCursor>,
    page_size: usize,
    max_pages: u32,
    pages_fetched: u32,
    records_seen: u64,
    stopped: Option<StopReason>,
}

impl PullTracker {
    /// Start a run from a persisted cursor, or from the beginning.
    pub fn new(cursor: Option<PullCursor>, page_size: usize, max_pages: u32) -> Self {
        Self {
            cursor,
            page_size,
            max_pages,
            pages_fetched: 0,
            records_seen: 0,
            stopped: None,
        }
    }

    /// The next page to request, or `None` once the run is over.
    pub fn next_request(&self) -> Option<PageRequest> {
        if self.stopped.is_some() {
            return None;
        }
        Some(PageRequest {
            after: self.cursor.clone(),
            limit: self.page_size,
        })
    }

    /// Record a fetched page.
    ///
    /// `last` is the key of the page's final record. Returns the stop
    /// reason if this page ended the run.
    pub fn record_page(&mut self, len: usize, last: Option<PullCursor>) -> Option<StopReason> {
        self.pages_fetched += 1;

        if len == 0 {
            self.stopped = Some(StopReason::EmptyPage);
            return self.stopped;
        }

        self.records_seen += len as u64;
        if let Some(last) = last {
            self.cursor = Some(last);
        }

        self.stopped = if len < self.page_size {
            Some(StopReason::ShortPage)
        } else if self.pages_fetched >= self.max_pages {
            Some(StopReason::MaxPages)
        } else {
            None
        };
        self.stopped
    }

    /// Current cursor.
    pub fn cursor(&self) -> Option<&PullCursor> {
        self.cursor.as_ref()
    }

    /// Pages fetched so far, including a final empty page.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Records received so far.
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Why the run stopped, if it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }
}
