//! Explicit transaction lifecycle. The controller tracks the state machine
//! and owns the commit pass; the worker's FIFO task order means the
//! apply-and-commit task can never interleave with a query.

use serde::Serialize;

use crate::core::connection::ConnectionHandle;
use crate::core::grid::ResultGrid;
use crate::core::synth;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnState {
    Idle,
    Active,
    Committing,
    RollingBack,
}

impl TxnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnState::Idle => "idle",
            TxnState::Active => "active",
            TxnState::Committing => "committing",
            TxnState::RollingBack => "rolling_back",
        }
    }
}

impl std::fmt::Display for TxnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct TransactionController {
    state: TxnState,
}

impl Default for TransactionController {
    fn default() -> Self {
        TransactionController::new()
    }
}

impl TransactionController {
    pub fn new() -> TransactionController {
        TransactionController {
            state: TxnState::Idle,
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    pub async fn begin(&mut self, handle: &ConnectionHandle) -> AppResult<()> {
        self.expect(TxnState::Idle, "begin")?;
        handle.begin().await?;
        self.state = TxnState::Active;
        tracing::debug!("transaction opened");
        Ok(())
    }

    /// Synthesize updates from the grid's staged edits and apply them plus
    /// COMMIT as one worker task. All-or-nothing: on any failure the worker
    /// has already rolled back, the controller returns to Idle, and the
    /// staged edits survive for a retry.
    pub async fn commit(
        &mut self,
        handle: &ConnectionHandle,
        grid: Option<&mut ResultGrid>,
    ) -> AppResult<usize> {
        self.expect(TxnState::Active, "commit")?;
        let statements = match grid.as_deref() {
            Some(g) => synth::synthesize(g)?,
            None => Vec::new(),
        };

        self.state = TxnState::Committing;
        let applied = if statements.is_empty() {
            handle.commit().await.map(|_| 0)
        } else {
            handle.apply_and_commit(statements).await
        };
        self.state = TxnState::Idle;

        match applied {
            Ok(n) => {
                if let Some(g) = grid {
                    g.clear_edits();
                }
                tracing::info!(statements = n, "transaction committed");
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }

    /// Abandon the transaction and every staged edit.
    pub async fn rollback(
        &mut self,
        handle: &ConnectionHandle,
        grid: Option<&mut ResultGrid>,
    ) -> AppResult<()> {
        self.expect(TxnState::Active, "rollback")?;
        self.state = TxnState::RollingBack;
        let res = handle.rollback().await;
        self.state = TxnState::Idle;
        if let Some(g) = grid {
            g.clear_edits();
        }
        tracing::debug!("transaction rolled back");
        res
    }

    fn expect(&self, want: TxnState, op: &'static str) -> AppResult<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(AppError::TxnState {
                op,
                state: self.state.as_str(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::MEMORY_PATH;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::open(MEMORY_PATH, 100).expect("open")
    }

    #[tokio::test]
    async fn begin_twice_is_a_state_error() {
        let h = handle();
        let mut txn = TransactionController::new();
        txn.begin(&h).await.expect("begin");
        let err = txn.begin(&h).await.unwrap_err();
        assert_eq!(err.code(), "TXN_STATE");
        assert!(err.to_string().contains("active"));
        assert!(txn.is_active(), "failed begin does not disturb the state");
    }

    #[tokio::test]
    async fn commit_and_rollback_require_an_open_transaction() {
        let h = handle();
        let mut txn = TransactionController::new();
        assert_eq!(txn.commit(&h, None).await.unwrap_err().code(), "TXN_STATE");
        assert_eq!(
            txn.rollback(&h, None).await.unwrap_err().code(),
            "TXN_STATE"
        );
    }

    #[tokio::test]
    async fn empty_commit_closes_the_transaction() {
        let h = handle();
        let mut txn = TransactionController::new();
        txn.begin(&h).await.expect("begin");
        assert_eq!(txn.commit(&h, None).await.expect("commit"), 0);
        assert_eq!(txn.state(), TxnState::Idle);
    }

    #[tokio::test]
    async fn rollback_returns_to_idle() {
        let h = handle();
        let mut txn = TransactionController::new();
        txn.begin(&h).await.expect("begin");
        txn.rollback(&h, None).await.expect("rollback");
        assert_eq!(txn.state(), TxnState::Idle);
        // The cycle can start over.
        txn.begin(&h).await.expect("begin again");
        txn.rollback(&h, None).await.expect("rollback again");
    }
}
