//! Statement execution on the worker thread. Everything here runs with the
//! connection exclusively owned, so there is no locking; cooperation with
//! the rest of the engine happens through the cancellation flag and the
//! progress channel threaded in from the submitting side.

use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{Connection, Row, Statement};
use tokio::sync::mpsc;

use crate::core::lexer::tokenize;
use crate::core::synth::UpdateStatement;
use crate::core::types::{ColumnDescriptor, QueryOutcome, QueryRequest, Value};
use crate::error::{AppError, AppResult};

/// Execute one submission to its terminal outcome. SQL failures become
/// `Failure` outcomes rather than errors; the connection stays usable.
pub fn run_statement(
    conn: &Connection,
    request: &QueryRequest,
    batch_rows: usize,
    cancel: &AtomicBool,
    progress: &mpsc::Sender<u64>,
) -> QueryOutcome {
    // A submission superseded while still queued never touches the database.
    if cancel.load(Ordering::SeqCst) {
        return QueryOutcome::Cancelled;
    }
    match execute_inner(conn, request, batch_rows, cancel, progress) {
        Ok(outcome) => outcome,
        Err(AppError::Query { message, position }) => QueryOutcome::Failure { message, position },
        Err(e) => QueryOutcome::Failure {
            message: e.to_string(),
            position: None,
        },
    }
}

fn execute_inner(
    conn: &Connection,
    request: &QueryRequest,
    batch_rows: usize,
    cancel: &AtomicBool,
    progress: &mpsc::Sender<u64>,
) -> AppResult<QueryOutcome> {
    let mut stmt = conn.prepare(&request.sql)?;

    // No result columns means DML or DDL: run it and report the change count.
    if stmt.column_count() == 0 {
        let is_insert = tokenize(&request.sql)
            .first()
            .map(|t| t.is_kw("INSERT"))
            .unwrap_or(false);
        let changes = stmt.execute([])?;
        return Ok(QueryOutcome::Affected {
            rows: changes as u64,
            last_insert_rowid: is_insert.then(|| conn.last_insert_rowid()),
        });
    }

    let columns = describe_columns(&stmt);
    let ncols = columns.len();
    let batch_rows = batch_rows.max(1);

    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut hit_cap = false;
    let mut cursor = stmt.query([])?;

    'fetch: loop {
        for _ in 0..batch_rows {
            match cursor.next()? {
                Some(row) => {
                    if rows.len() >= request.limit {
                        hit_cap = true;
                        break 'fetch;
                    }
                    rows.push(read_row(row, ncols)?);
                }
                None => break 'fetch,
            }
        }
        // Between batches: report, then honor cancellation. blocking_send
        // keeps the worker from racing unboundedly ahead of a consumer that
        // still holds the receiver; a dropped receiver just ends the
        // backpressure.
        let _ = progress.blocking_send(rows.len() as u64);
        if cancel.load(Ordering::SeqCst) {
            return Ok(QueryOutcome::Cancelled);
        }
    }

    let row_count = rows.len();
    let truncated = hit_cap || (request.auto_limited && row_count == request.limit);
    Ok(QueryOutcome::Rows {
        columns,
        rows,
        row_count,
        truncated,
    })
}

fn describe_columns(stmt: &Statement<'_>) -> Vec<ColumnDescriptor> {
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let decl = stmt.columns()[i].decl_type().map(|s| s.to_string());
            ColumnDescriptor::new(name, decl)
        })
        .collect()
}

fn read_row(row: &Row<'_>, ncols: usize) -> AppResult<Vec<Value>> {
    let mut out = Vec::with_capacity(ncols);
    for i in 0..ncols {
        out.push(Value::from_sqlite(row.get_ref(i)?));
    }
    Ok(out)
}

/// Run every synthesized update, then COMMIT, as one indivisible pass. The
/// first failure rolls the whole transaction back and reports which
/// statement died; the staged edits behind it are untouched by design of
/// the caller.
pub fn apply_updates(conn: &Connection, statements: &[UpdateStatement]) -> AppResult<usize> {
    for (i, update) in statements.iter().enumerate() {
        if let Err(e) = conn.execute(&update.sql, rusqlite::params_from_iter(update.params.iter()))
        {
            let message = e.to_string();
            tracing::warn!(statement = i, error = %message, "update failed, rolling back");
            roll_back(conn);
            return Err(AppError::CommitFailed {
                statement: Some(i),
                message,
            });
        }
    }
    if let Err(e) = conn.execute_batch("COMMIT") {
        let message = e.to_string();
        roll_back(conn);
        return Err(AppError::CommitFailed {
            statement: None,
            message,
        });
    }
    Ok(statements.len())
}

fn roll_back(conn: &Connection) {
    if let Err(e) = conn.execute_batch("ROLLBACK") {
        tracing::error!(error = %e, "rollback after failed commit also failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::prepare_request;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT, price REAL);
             INSERT INTO items (label, price) VALUES ('a', 1.0), ('b', 2.5), ('c', 0.0),
                                                     ('d', 9.9), ('e', 4.2);",
        )
        .expect("seed schema");
        conn
    }

    fn run(conn: &Connection, req: &QueryRequest) -> QueryOutcome {
        let cancel = AtomicBool::new(false);
        let (tx, _rx) = mpsc::channel(8);
        run_statement(conn, req, 2, &cancel, &tx)
    }

    #[test]
    fn select_returns_rows_and_described_columns() {
        let conn = test_conn();
        let req = prepare_request("SELECT id, label, price FROM items", None, 100);
        match run(&conn, &req) {
            QueryOutcome::Rows {
                columns,
                rows,
                row_count,
                truncated,
            } => {
                assert_eq!(row_count, 5);
                assert_eq!(rows.len(), 5);
                assert!(!truncated);
                assert_eq!(columns[0].name, "id");
                assert_eq!(columns[1].decl_type.as_deref(), Some("TEXT"));
                assert_eq!(rows[0][1], Value::Text("a".into()));
                assert_eq!(rows[1][2], Value::Real(2.5));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn insert_reports_changes_and_rowid() {
        let conn = test_conn();
        let req = prepare_request("INSERT INTO items (label) VALUES ('f')", None, 100);
        match run(&conn, &req) {
            QueryOutcome::Affected {
                rows,
                last_insert_rowid,
            } => {
                assert_eq!(rows, 1);
                assert_eq!(last_insert_rowid, Some(6));
            }
            other => panic!("expected affected, got {other:?}"),
        }
    }

    #[test]
    fn update_reports_changes_without_rowid() {
        let conn = test_conn();
        let req = prepare_request("UPDATE items SET price = 0 WHERE id <= 2", None, 100);
        match run(&conn, &req) {
            QueryOutcome::Affected {
                rows,
                last_insert_rowid,
            } => {
                assert_eq!(rows, 2);
                assert_eq!(last_insert_rowid, None);
            }
            other => panic!("expected affected, got {other:?}"),
        }
    }

    #[test]
    fn sql_errors_become_failures_and_leave_the_connection_usable() {
        let conn = test_conn();
        let req = prepare_request("SELECT * FROM no_such_table", None, 100);
        match run(&conn, &req) {
            QueryOutcome::Failure { message, .. } => {
                assert!(message.contains("no_such_table"), "message {message:?}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let again = prepare_request("SELECT * FROM items", None, 100);
        assert!(matches!(run(&conn, &again), QueryOutcome::Rows { .. }));
    }

    #[test]
    fn auto_limit_marks_full_fetch_truncated() {
        let conn = test_conn();
        let req = prepare_request("SELECT * FROM items", None, 5);
        match run(&conn, &req) {
            QueryOutcome::Rows {
                row_count,
                truncated,
                ..
            } => {
                assert_eq!(row_count, 5);
                assert!(truncated, "exactly-full capped fetch reports truncation");
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn fetch_cap_truncates_user_limited_query() {
        let conn = test_conn();
        // User LIMIT survives; the engine cap is smaller and stops early.
        let req = prepare_request("SELECT * FROM items LIMIT 5", None, 3);
        match run(&conn, &req) {
            QueryOutcome::Rows {
                row_count,
                truncated,
                ..
            } => {
                assert_eq!(row_count, 3);
                assert!(truncated);
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn under_cap_fetch_is_not_truncated() {
        let conn = test_conn();
        let req = prepare_request("SELECT * FROM items", None, 100);
        match run(&conn, &req) {
            QueryOutcome::Rows { truncated, .. } => assert!(!truncated),
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn pre_cancelled_request_never_executes() {
        let conn = test_conn();
        let cancel = AtomicBool::new(true);
        let (tx, _rx) = mpsc::channel(8);
        let req = prepare_request("DELETE FROM items", None, 100);
        let outcome = run_statement(&conn, &req, 2, &cancel, &tx);
        assert!(matches!(outcome, QueryOutcome::Cancelled));

        let count: i64 = conn
            .query_row("SELECT count(*) FROM items", [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 5, "cancelled DML must not run");
    }

    #[test]
    fn cancel_between_batches_stops_the_fetch() {
        use std::sync::Arc;

        let conn = test_conn();
        conn.execute_batch(
            "CREATE TABLE big (n INTEGER PRIMARY KEY);
             INSERT INTO big (n)
               WITH RECURSIVE seq(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM seq WHERE x < 500)
               SELECT x FROM seq;",
        )
        .expect("seed big");

        // Capacity 4: the worker can run at most five batches past the last
        // drained report, so the flag is always seen long before row 500.
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel(4);
        let req = prepare_request("SELECT * FROM big", None, 1000);

        let flag = cancel.clone();
        let worker = std::thread::spawn(move || run_statement(&conn, &req, 10, &flag, &tx));

        let first = rx.blocking_recv().expect("first progress report");
        assert_eq!(first, 10);
        cancel.store(true, Ordering::SeqCst);
        while rx.blocking_recv().is_some() {}

        let outcome = worker.join().expect("worker thread");
        assert!(matches!(outcome, QueryOutcome::Cancelled));
    }
}
