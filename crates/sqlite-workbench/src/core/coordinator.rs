//! Submission bookkeeping. At most one query is in flight per session;
//! submitting another flips the predecessor's cancellation flag before the
//! successor is enqueued, so FIFO task order guarantees the cancelled
//! outcome resolves first and the two never interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::core::connection::ConnectionHandle;
use crate::core::types::{QueryOutcome, QueryRequest, SubmissionId};
use crate::error::AppResult;

/// Capacity of the per-submission progress channel. With `blocking_send` on
/// the worker side this caps how many batches it can fetch past the last
/// report a live consumer drained, which is what makes mid-stream
/// cancellation observable at a known point.
pub const PROGRESS_CAPACITY: usize = 8;

/// One dispatched query. `outcome` resolves exactly once; `progress` carries
/// cumulative fetched-row counts. Drop `progress` if you do not care, the
/// worker will not block on it.
pub struct Submission {
    pub id: SubmissionId,
    pub outcome: oneshot::Receiver<QueryOutcome>,
    pub progress: mpsc::Receiver<u64>,
}

struct ActiveQuery {
    id: SubmissionId,
    cancel: Arc<AtomicBool>,
}

pub struct QueryCoordinator {
    next_id: u64,
    active: Option<ActiveQuery>,
}

impl Default for QueryCoordinator {
    fn default() -> Self {
        QueryCoordinator::new()
    }
}

impl QueryCoordinator {
    /// Ids start at 1 so a zero is never a real submission.
    pub fn new() -> QueryCoordinator {
        QueryCoordinator {
            next_id: 1,
            active: None,
        }
    }

    /// Dispatch a request, superseding whatever is still running.
    pub fn submit(
        &mut self,
        handle: &ConnectionHandle,
        request: QueryRequest,
    ) -> AppResult<Submission> {
        self.cancel_active();

        let id = SubmissionId(self.next_id);
        self.next_id += 1;

        let cancel = Arc::new(AtomicBool::new(false));
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CAPACITY);
        let outcome = handle.submit_query(request, cancel.clone(), progress_tx)?;

        self.active = Some(ActiveQuery { id, cancel });
        Ok(Submission {
            id,
            outcome,
            progress: progress_rx,
        })
    }

    /// Flip the active submission's flag. The worker notices before its next
    /// batch; a still-queued task notices before executing at all.
    pub fn cancel_active(&mut self) -> bool {
        match &self.active {
            Some(active) => {
                active.cancel.store(true, Ordering::SeqCst);
                tracing::debug!(id = %active.id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel one specific submission; stale ids are a no-op.
    pub fn cancel(&mut self, id: SubmissionId) -> bool {
        match &self.active {
            Some(active) if active.id == id => self.cancel_active(),
            _ => false,
        }
    }

    /// Mark a submission's outcome as consumed. Stale ids are ignored.
    pub fn finish(&mut self, id: SubmissionId) {
        if self.active.as_ref().map(|a| a.id) == Some(id) {
            self.active = None;
        }
    }

    pub fn active_id(&self) -> Option<SubmissionId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}
