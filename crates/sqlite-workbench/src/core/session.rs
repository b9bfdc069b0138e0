//! One open database and everything hanging off it: the worker handle, the
//! submission coordinator, the transaction controller, the metadata cache
//! and the current result grid. All mutation funnels through `&mut self`,
//! so control-side state needs no locks; the worker thread is the only
//! other actor and it owns nothing but the connection.

use serde::Serialize;

use crate::core::analyzer::{self, ReadOnlyReason, Verdict};
use crate::core::connection::ConnectionHandle;
use crate::core::coordinator::{QueryCoordinator, Submission};
use crate::core::events::{EngineEvent, EventSender};
use crate::core::grid::{EditStatus, ResultGrid, StagedEdit};
use crate::core::lexer::tokenize;
use crate::core::limits::prepare_request;
use crate::core::metadata::MetadataCache;
use crate::core::txn::{TransactionController, TxnState};
use crate::core::types::{quote_ident, ColumnInfo, QueryOutcome, SubmissionId};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Auto-append cap and per-request clamp.
    pub max_rows: usize,
    /// Rows per fetch batch, the cancellation-check granularity.
    pub fetch_batch: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_rows: 1000,
            fetch_batch: 200,
        }
    }
}

/// Statusbar-style snapshot of the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub database: String,
    pub txn_state: TxnState,
    pub row_count: Option<usize>,
    pub edit_count: usize,
    pub editable: bool,
    pub truncated: bool,
}

struct PendingQuery {
    id: SubmissionId,
    sql: String,
}

pub struct Session {
    handle: ConnectionHandle,
    coordinator: QueryCoordinator,
    txn: TransactionController,
    meta: MetadataCache,
    grid: Option<ResultGrid>,
    pending: Option<PendingQuery>,
    events: EventSender,
    config: SessionConfig,
}

impl Session {
    pub fn open(path: &str, config: SessionConfig, events: EventSender) -> AppResult<Session> {
        let handle = ConnectionHandle::open(path, config.fetch_batch)?;
        let meta = MetadataCache::new(handle.clone());
        tracing::info!(path, "session opened");
        Ok(Session {
            handle,
            coordinator: QueryCoordinator::new(),
            txn: TransactionController::new(),
            meta,
            grid: None,
            pending: None,
            events,
            config,
        })
    }

    /// Dispatch a statement and return immediately. Whatever was running is
    /// cancelled first; staged edits and an open transaction belong to the
    /// superseded result set and are discarded, with a warning event, before
    /// the new query goes out.
    pub async fn submit_query(
        &mut self,
        sql: &str,
        limit: Option<usize>,
    ) -> AppResult<Submission> {
        // Free the worker promptly so the implicit rollback below does not
        // wait out a long fetch.
        self.coordinator.cancel_active();
        self.discard_previous().await?;

        let request = prepare_request(sql, limit, self.config.max_rows);
        let executed_sql = request.sql.clone();
        let submission = self.coordinator.submit(&self.handle, request)?;
        self.pending = Some(PendingQuery {
            id: submission.id,
            sql: executed_sql,
        });
        self.emit(EngineEvent::QueryStarted { id: submission.id });
        tracing::debug!(id = %submission.id, "query submitted");
        Ok(submission)
    }

    /// Feed a terminal outcome back in. Only the newest submission installs
    /// a result grid; superseded ones still get their completion event so
    /// consumers can retire spinners.
    pub async fn complete(&mut self, id: SubmissionId, outcome: QueryOutcome) -> AppResult<()> {
        self.coordinator.finish(id);

        let current = match &self.pending {
            Some(p) if p.id == id => {
                let sql = p.sql.clone();
                self.pending = None;
                Some(sql)
            }
            _ => None,
        };

        if let Some(sql) = current {
            match &outcome {
                QueryOutcome::Rows {
                    columns,
                    rows,
                    truncated,
                    ..
                } => {
                    let verdict = self.classify(&sql).await;
                    self.grid = Some(ResultGrid::new(
                        columns.clone(),
                        rows.clone(),
                        *truncated,
                        verdict,
                    ));
                }
                QueryOutcome::Affected { .. } => {
                    if statement_changes_catalog(&sql) {
                        self.meta.invalidate();
                    }
                }
                // Failures and cancellations leave the previous grid alone.
                QueryOutcome::Cancelled | QueryOutcome::Failure { .. } => {}
            }
        }

        self.emit(EngineEvent::QueryCompleted { id, outcome });
        Ok(())
    }

    /// Forward a worker progress report for the newest submission.
    pub fn note_progress(&mut self, id: SubmissionId, rows: u64) {
        if self.pending.as_ref().map(|p| p.id) == Some(id) {
            self.emit(EngineEvent::QueryProgress { id, rows });
        }
    }

    /// Cancel a specific submission, or whatever is active.
    pub fn cancel(&mut self, id: Option<SubmissionId>) -> bool {
        match id {
            Some(id) => self.coordinator.cancel(id),
            None => self.coordinator.cancel_active(),
        }
    }

    pub fn stage_edit(
        &mut self,
        row: usize,
        col: usize,
        input: Option<&str>,
    ) -> AppResult<EditStatus> {
        let grid = self
            .grid
            .as_mut()
            .ok_or_else(|| AppError::InvalidRequest("no result set to edit".into()))?;
        match grid.stage_edit(row, col, input) {
            Ok(EditStatus::Staged) => {
                self.emit(EngineEvent::EditStaged { row, col });
                Ok(EditStatus::Staged)
            }
            Ok(EditStatus::Reverted) => {
                self.emit(EngineEvent::EditReverted { row, col });
                Ok(EditStatus::Reverted)
            }
            Err(reject) => {
                self.emit(EngineEvent::EditRejected {
                    row,
                    col,
                    reason: reject.to_string(),
                });
                Err(AppError::EditRejected(reject))
            }
        }
    }

    pub async fn begin(&mut self) -> AppResult<()> {
        self.ensure_no_query_in_flight("begin")?;
        self.txn.begin(&self.handle).await
    }

    pub async fn commit(&mut self) -> AppResult<usize> {
        self.ensure_no_query_in_flight("commit")?;
        match self.txn.commit(&self.handle, self.grid.as_mut()).await {
            Ok(n) => {
                self.emit(EngineEvent::CommitSucceeded { statements: n });
                Ok(n)
            }
            Err(e) => {
                if !matches!(e, AppError::TxnState { .. }) {
                    self.emit(EngineEvent::CommitFailed {
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    pub async fn rollback(&mut self) -> AppResult<()> {
        self.ensure_no_query_in_flight("rollback")?;
        self.txn.rollback(&self.handle, self.grid.as_mut()).await?;
        self.emit(EngineEvent::RollbackCompleted);
        Ok(())
    }

    pub fn grid(&self) -> Option<&ResultGrid> {
        self.grid.as_ref()
    }

    pub fn staged_edits(&self) -> Vec<StagedEdit> {
        self.grid
            .as_ref()
            .map(|g| g.edits().cloned().collect())
            .unwrap_or_default()
    }

    pub fn txn_state(&self) -> TxnState {
        self.txn.state()
    }

    pub fn metadata(&mut self) -> &mut MetadataCache {
        &mut self.meta
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            database: self.handle.database_info().name,
            txn_state: self.txn.state(),
            row_count: self.grid.as_ref().map(|g| g.row_count()),
            edit_count: self.grid.as_ref().map(|g| g.edit_count()).unwrap_or(0),
            editable: self
                .grid
                .as_ref()
                .map(|g| g.verdict().editable)
                .unwrap_or(false),
            truncated: self.grid.as_ref().map(|g| g.truncated()).unwrap_or(false),
        }
    }

    /// Browse helper: a SELECT * over one table, keyed rows first by their
    /// primary key ascending.
    pub async fn table_statement(&mut self, schema: &str, table: &str) -> AppResult<String> {
        let cols = self.meta.columns(schema, table).await?;
        if cols.is_empty() {
            return Err(AppError::InvalidRequest(format!(
                "unknown table: {schema}.{table}"
            )));
        }
        let mut keyed: Vec<&ColumnInfo> = cols.iter().filter(|c| c.is_primary_key()).collect();
        keyed.sort_by_key(|c| c.pk_position);

        let mut sql = format!(
            "SELECT * FROM {}.{}",
            quote_ident(schema),
            quote_ident(table)
        );
        if !keyed.is_empty() {
            let order: Vec<String> = keyed
                .iter()
                .map(|c| format!("{} ASC", quote_ident(&c.name)))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        Ok(sql)
    }

    async fn discard_previous(&mut self) -> AppResult<()> {
        let staged = self.grid.as_ref().map(|g| g.edit_count()).unwrap_or(0);
        if staged > 0 {
            tracing::info!(count = staged, "new query supersedes staged edits");
            self.emit(EngineEvent::EditsDiscarded { count: staged });
        }
        if self.txn.is_active() {
            self.txn.rollback(&self.handle, self.grid.as_mut()).await?;
            self.emit(EngineEvent::RollbackCompleted);
        } else if let Some(g) = self.grid.as_mut() {
            g.clear_edits();
        }
        Ok(())
    }

    async fn classify(&mut self, sql: &str) -> Verdict {
        let Some(shape) = analyzer::select_shape(sql) else {
            return Verdict::read_only(ReadOnlyReason::ComplexStatement);
        };
        match self.meta.snapshot(&shape.table).await {
            Ok(snapshot) => analyzer::verdict(&shape, &snapshot),
            Err(e) => {
                tracing::debug!(error = %e, table = %shape.table, "snapshot failed; read-only");
                Verdict::read_only(ReadOnlyReason::NotBaseTable)
            }
        }
    }

    /// Transaction boundaries queue behind in-flight work on the worker, so
    /// reaching for one mid-query is almost always a client bug; refuse it.
    fn ensure_no_query_in_flight(&self, op: &str) -> AppResult<()> {
        if self.coordinator.is_active() {
            return Err(AppError::InvalidRequest(format!(
                "cannot {op} while a query is executing"
            )));
        }
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

// CREATE/DROP/ALTER/ATTACH/DETACH change what the catalog cache mirrors.
fn statement_changes_catalog(sql: &str) -> bool {
    tokenize(sql)
        .first()
        .map(|t| {
            ["CREATE", "DROP", "ALTER", "ATTACH", "DETACH"]
                .iter()
                .any(|kw| t.is_kw(kw))
        })
        .unwrap_or(false)
}
