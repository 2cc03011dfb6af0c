//! Progress reporting and cooperative cancellation
//!
//! Long-running bulk operations (journal replay, offline prefetch) report
//! 0-100 progress over a channel and poll a shared cancellation flag between
//! units of work. Cancellation is cooperative only: a cancelled replay still
//! runs its normal exit path (including journal truncation).

use flume::{Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single progress update from a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Which operation is reporting ("replay", "prefetch", ...)
    pub phase: &'static str,
    /// Percent complete, 0-100
    pub percent: u8,
}

/// Producer half: owned by the operation doing the work.
#[derive(Clone)]
pub struct ProgressSink {
    tx: Option<Sender<ProgressEvent>>,
    cancelled: Arc<AtomicBool>,
}

/// Consumer half: owned by whoever observes progress and may cancel.
pub struct ProgressMonitor {
    rx: Receiver<ProgressEvent>,
    cancelled: Arc<AtomicBool>,
}

/// Create a connected sink/monitor pair.
pub fn channel() -> (ProgressSink, ProgressMonitor) {
    let (tx, rx) = flume::unbounded();
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        ProgressSink {
            tx: Some(tx),
            cancelled: cancelled.clone(),
        },
        ProgressMonitor { rx, cancelled },
    )
}

impl ProgressSink {
    /// A sink with no observer. Reports go nowhere and cancellation never
    /// triggers. Used by callers that don't care about progress.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report a progress value. Never blocks; if the monitor is gone the
    /// event is dropped.
    pub fn report(&self, phase: &'static str, percent: u8) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(ProgressEvent {
                phase,
                percent: percent.min(100),
            });
        }
    }

    /// Polled between records/uids by bulk operations.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl ProgressMonitor {
    /// Request cooperative cancellation of the operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Non-blocking read of the next progress event, if any.
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain all events currently buffered.
    pub fn drain(&self) -> Vec<ProgressEvent> {
        self.rx.drain().collect()
    }
}
