//! Outbound notifications. The session pushes these through an unbounded
//! channel in the order things happened; consumers that care about ordering
//! guarantees (discard warnings before the superseding query's outcome)
//! get them for free from the channel.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::types::{QueryOutcome, SubmissionId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    QueryStarted {
        id: SubmissionId,
    },
    QueryProgress {
        id: SubmissionId,
        rows: u64,
    },
    QueryCompleted {
        id: SubmissionId,
        outcome: QueryOutcome,
    },
    EditStaged {
        row: usize,
        col: usize,
    },
    EditReverted {
        row: usize,
        col: usize,
    },
    EditRejected {
        row: usize,
        col: usize,
        reason: String,
    },
    /// Staged edits were thrown away because a new query superseded the
    /// result set they belonged to.
    EditsDiscarded {
        count: usize,
    },
    CommitSucceeded {
        statements: usize,
    },
    CommitFailed {
        reason: String,
    },
    RollbackCompleted,
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
