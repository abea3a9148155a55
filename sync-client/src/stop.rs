//! Cooperative cancellation for running pipelines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flag checked by the pipelines between batches and pages.
///
/// A stopped run never abandons a batch commit halfway: it returns after
/// the last fully committed batch or advanced cursor.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at its next boundary.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
