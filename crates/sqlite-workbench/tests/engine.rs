//! End-to-end session flows against real databases: fetch, edit, commit,
//! cancel, supersede. Everything here goes through the public session API
//! the way the bridge drives it.

use sqlite_workbench::core::analyzer::ReadOnlyReason;
use sqlite_workbench::core::events::{self, EngineEvent, EventReceiver};
use sqlite_workbench::core::grid::EditStatus;
use sqlite_workbench::core::session::{Session, SessionConfig};
use sqlite_workbench::core::txn::TxnState;
use sqlite_workbench::core::types::{QueryOutcome, Value};
use sqlite_workbench::error::AppError;

async fn exec(session: &mut Session, sql: &str) -> QueryOutcome {
    let sub = session.submit_query(sql, None).await.expect("submit");
    let outcome = sub.outcome.await.expect("outcome");
    session
        .complete(sub.id, outcome.clone())
        .await
        .expect("complete");
    outcome
}

async fn open_seeded() -> (Session, EventReceiver) {
    let (tx, rx) = events::channel();
    let mut session =
        Session::open(":memory:", SessionConfig::default(), tx).expect("open session");
    exec(
        &mut session,
        "CREATE TABLE parts (id INTEGER PRIMARY KEY, name TEXT, qty INTEGER, price REAL)",
    )
    .await;
    exec(
        &mut session,
        "INSERT INTO parts (name, qty, price) VALUES \
         ('bolt', 100, 0.05), ('nut', 250, 0.02), ('washer', 500, 0.01)",
    )
    .await;
    (session, rx)
}

fn drain(rx: &mut EventReceiver) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn edit_and_commit_persists_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("workbench.db");
    let path = path.to_str().expect("utf8 path").to_string();

    {
        let (tx, _rx) = events::channel();
        let mut session =
            Session::open(&path, SessionConfig::default(), tx).expect("open session");
        exec(
            &mut session,
            "CREATE TABLE parts (id INTEGER PRIMARY KEY, name TEXT, qty INTEGER)",
        )
        .await;
        exec(
            &mut session,
            "INSERT INTO parts (name, qty) VALUES ('bolt', 100), ('nut', 250)",
        )
        .await;
        exec(&mut session, "SELECT * FROM parts").await;

        assert_eq!(
            session.stage_edit(0, 2, Some("150")).expect("stage"),
            EditStatus::Staged
        );
        assert_eq!(
            session.stage_edit(1, 1, Some("locknut")).expect("stage"),
            EditStatus::Staged
        );

        session.begin().await.expect("begin");
        let applied = session.commit().await.expect("commit");
        assert_eq!(applied, 2, "one update per edited row");
        assert_eq!(session.txn_state(), TxnState::Idle);
        assert_eq!(session.status().edit_count, 0);
    }

    // Fresh session over the same file sees the committed values.
    let (tx, _rx) = events::channel();
    let mut session = Session::open(&path, SessionConfig::default(), tx).expect("reopen");
    let outcome = exec(&mut session, "SELECT qty, name FROM parts").await;
    let QueryOutcome::Rows { rows, .. } = outcome else {
        panic!("expected rows");
    };
    assert_eq!(rows[0][0], Value::Integer(150));
    assert_eq!(rows[1][1], Value::Text("locknut".to_string()));
}

#[tokio::test]
async fn multiple_edits_in_one_row_are_one_statement() {
    let (mut session, _rx) = open_seeded().await;
    exec(&mut session, "SELECT * FROM parts").await;

    session.stage_edit(0, 1, Some("hex bolt")).expect("stage");
    session.stage_edit(0, 2, Some("101")).expect("stage");
    session.stage_edit(2, 2, Some("499")).expect("stage");

    session.begin().await.expect("begin");
    let applied = session.commit().await.expect("commit");
    assert_eq!(applied, 2);

    let outcome = exec(&mut session, "SELECT name, qty FROM parts ORDER BY id").await;
    let QueryOutcome::Rows { rows, .. } = outcome else {
        panic!("expected rows");
    };
    assert_eq!(rows[0][0], Value::Text("hex bolt".to_string()));
    assert_eq!(rows[0][1], Value::Integer(101));
    assert_eq!(rows[2][1], Value::Integer(499));
}

#[tokio::test]
async fn failed_commit_rolls_back_and_keeps_edits() {
    let (mut session, _rx) = open_seeded().await;
    exec(
        &mut session,
        "CREATE UNIQUE INDEX parts_name ON parts (name)",
    )
    .await;
    exec(&mut session, "SELECT * FROM parts").await;

    // Renaming row 0 to an existing name trips the unique index.
    session.stage_edit(0, 1, Some("nut")).expect("stage");
    session.stage_edit(1, 2, Some("999")).expect("stage");

    session.begin().await.expect("begin");
    let err = session.commit().await.expect_err("duplicate name");
    assert!(matches!(err, AppError::CommitFailed { .. }));

    // Back to idle, edits survive for a retry.
    assert_eq!(session.txn_state(), TxnState::Idle);
    assert_eq!(session.status().edit_count, 2);

    // Nothing reached the database, including the update that would have
    // succeeded on its own.
    let outcome = exec(&mut session, "SELECT name, qty FROM parts ORDER BY id").await;
    let QueryOutcome::Rows { rows, .. } = outcome else {
        panic!("expected rows");
    };
    assert_eq!(rows[0][0], Value::Text("bolt".to_string()));
    assert_eq!(rows[1][1], Value::Integer(250));
}

#[tokio::test]
async fn rollback_discards_staged_edits() {
    let (mut session, _rx) = open_seeded().await;
    exec(&mut session, "SELECT * FROM parts").await;

    session.stage_edit(0, 2, Some("1")).expect("stage");
    let grid = session.grid().expect("grid");
    assert_eq!(grid.value_at(0, 2), Some(&Value::Integer(1)));

    session.begin().await.expect("begin");
    session.rollback().await.expect("rollback");

    assert_eq!(session.txn_state(), TxnState::Idle);
    let grid = session.grid().expect("grid");
    assert_eq!(grid.edit_count(), 0);
    assert_eq!(grid.value_at(0, 2), Some(&Value::Integer(100)));
}

#[tokio::test]
async fn superseding_query_discards_edits_with_a_warning() {
    let (mut session, mut rx) = open_seeded().await;
    exec(&mut session, "SELECT * FROM parts").await;
    session.stage_edit(0, 2, Some("7")).expect("stage");
    drain(&mut rx);

    exec(&mut session, "SELECT name FROM parts").await;

    let events = drain(&mut rx);
    let discarded = events
        .iter()
        .position(|e| matches!(e, EngineEvent::EditsDiscarded { count: 1 }));
    let started = events
        .iter()
        .position(|e| matches!(e, EngineEvent::QueryStarted { .. }));
    assert!(discarded.expect("discard warning") < started.expect("start event"));
    assert_eq!(session.grid().expect("grid").edit_count(), 0);
}

#[tokio::test]
async fn cancel_stops_a_long_fetch_mid_stream() {
    let (tx, _rx) = events::channel();
    let config = SessionConfig {
        max_rows: 100_000,
        fetch_batch: 50,
    };
    let mut session = Session::open(":memory:", config, tx).expect("open session");

    let mut sub = session
        .submit_query(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq) \
             SELECT n FROM seq LIMIT 100000",
            None,
        )
        .await
        .expect("submit");

    // Wait for the first batch so the fetch is demonstrably under way,
    // then cancel and keep draining so the worker can reach its next check.
    let first = sub.progress.recv().await.expect("first progress report");
    assert_eq!(first, 50);
    assert!(session.cancel(None));
    while sub.progress.recv().await.is_some() {}

    let outcome = sub.outcome.await.expect("outcome");
    assert!(matches!(outcome, QueryOutcome::Cancelled));
    session.complete(sub.id, outcome).await.expect("complete");
    assert!(session.grid().is_none(), "cancelled fetch installs nothing");
}

#[tokio::test]
async fn bare_select_is_capped_and_flagged_truncated() {
    let (tx, _rx) = events::channel();
    let config = SessionConfig {
        max_rows: 100,
        fetch_batch: 40,
    };
    let mut session = Session::open(":memory:", config, tx).expect("open session");
    exec(&mut session, "CREATE TABLE numbers (n INTEGER PRIMARY KEY)").await;
    exec(
        &mut session,
        "WITH RECURSIVE seq(value) AS \
         (SELECT 1 UNION ALL SELECT value + 1 FROM seq WHERE value < 250) \
         INSERT INTO numbers SELECT value FROM seq",
    )
    .await;

    let outcome = exec(&mut session, "SELECT n FROM numbers").await;
    let QueryOutcome::Rows {
        row_count,
        truncated,
        ..
    } = outcome
    else {
        panic!("expected rows");
    };
    assert_eq!(row_count, 100);
    assert!(truncated);
    assert!(session.status().truncated);

    // An explicit narrower limit is honored and still flagged.
    let sub = session
        .submit_query("SELECT n FROM numbers", Some(10))
        .await
        .expect("submit");
    let outcome = sub.outcome.await.expect("outcome");
    let QueryOutcome::Rows {
        row_count,
        truncated,
        ..
    } = &outcome
    else {
        panic!("expected rows");
    };
    assert_eq!(*row_count, 10);
    assert!(*truncated);
    session.complete(sub.id, outcome).await.expect("complete");

    // A query that fits under the cap is not flagged.
    let outcome = exec(&mut session, "SELECT n FROM numbers WHERE n <= 5").await;
    let QueryOutcome::Rows {
        row_count,
        truncated,
        ..
    } = outcome
    else {
        panic!("expected rows");
    };
    assert_eq!(row_count, 5);
    assert!(!truncated);
}

#[tokio::test]
async fn joins_and_views_are_read_only() {
    let (mut session, _rx) = open_seeded().await;
    exec(
        &mut session,
        "CREATE TABLE suppliers (id INTEGER PRIMARY KEY, name TEXT)",
    )
    .await;
    exec(
        &mut session,
        "CREATE VIEW cheap_parts AS SELECT * FROM parts WHERE price < 0.03",
    )
    .await;

    exec(
        &mut session,
        "SELECT p.name, s.name FROM parts p JOIN suppliers s ON s.id = p.id",
    )
    .await;
    let verdict = session.grid().expect("grid").verdict().clone();
    assert!(!verdict.editable);
    assert_eq!(verdict.reason, Some(ReadOnlyReason::ComplexStatement));
    let err = session.stage_edit(0, 0, Some("x")).expect_err("read only");
    assert_eq!(err.code(), "EDIT_REJECTED");

    exec(&mut session, "SELECT * FROM cheap_parts").await;
    let verdict = session.grid().expect("grid").verdict().clone();
    assert!(!verdict.editable);
    assert_eq!(verdict.reason, Some(ReadOnlyReason::NotBaseTable));
}

#[tokio::test]
async fn query_lifecycle_emits_ordered_events() {
    let (mut session, mut rx) = open_seeded().await;
    drain(&mut rx);

    exec(&mut session, "SELECT * FROM parts").await;
    session.stage_edit(0, 2, Some("42")).expect("stage");
    session.begin().await.expect("begin");
    session.commit().await.expect("commit");

    let events = drain(&mut rx);
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            EngineEvent::QueryStarted { .. } => "started",
            EngineEvent::QueryCompleted { .. } => "completed",
            EngineEvent::EditStaged { .. } => "staged",
            EngineEvent::CommitSucceeded { .. } => "committed",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["started", "completed", "staged", "committed"]);

    let commit = events
        .iter()
        .find(|e| matches!(e, EngineEvent::CommitSucceeded { .. }))
        .expect("commit event");
    if let EngineEvent::CommitSucceeded { statements } = commit {
        assert_eq!(*statements, 1);
    }
}

#[tokio::test]
async fn transaction_calls_are_refused_mid_query() {
    let (mut session, _rx) = open_seeded().await;
    let sub = session
        .submit_query("SELECT * FROM parts", None)
        .await
        .expect("submit");

    let err = session.begin().await.expect_err("query in flight");
    assert_eq!(err.code(), "INVALID_REQUEST");

    let outcome = sub.outcome.await.expect("outcome");
    session.complete(sub.id, outcome).await.expect("complete");
    session.begin().await.expect("begin now idle");
    session.rollback().await.expect("rollback");
}

#[tokio::test]
async fn sql_errors_surface_position_and_keep_session_usable() {
    let (mut session, _rx) = open_seeded().await;
    let outcome = exec(&mut session, "SELECT * FRM parts").await;
    let QueryOutcome::Failure { message, .. } = outcome else {
        panic!("expected failure");
    };
    assert!(message.contains("FRM") || message.contains("syntax"));

    let outcome = exec(&mut session, "SELECT count(*) AS c FROM parts").await;
    assert!(matches!(outcome, QueryOutcome::Rows { .. }));
}
