//! Progress callback for reporting matrix progress.

use crate::model::{CaseStatus, CheckResult, ErrorInfo, RunId};

/// Event emitted while the matrix runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    MatrixStarted {
        run_id: RunId,
        total_cases: usize,
    },
    CaseStarted {
        /// 1-based position in the matrix.
        index: usize,
        name: String,
    },
    CaseCompleted {
        index: usize,
        name: String,
        status: CaseStatus,
        duration_ms: u64,
        /// Failed checks only.
        failures: Vec<CheckResult>,
        error: Option<ErrorInfo>,
    },
    MatrixCompleted {
        run_id: RunId,
        success: bool,
        duration_ms: u64,
    },
}

/// Receives progress events during a matrix run.
pub trait ProgressCallback: Send {
    fn on_progress(&self, event: &ProgressEvent);
}

/// A progress callback that discards all events.
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// A progress callback that collects events for testing.
#[derive(Default)]
pub struct CollectingProgress {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far; empty if the lock was poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressCallback for CollectingProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
