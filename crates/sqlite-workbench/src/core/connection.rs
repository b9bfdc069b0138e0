//! Connection ownership. A dedicated worker thread holds the only
//! `rusqlite::Connection`; everything else talks to it through a task
//! channel. Tasks run strictly in submission order, which is what makes
//! transaction phases and query results impossible to interleave.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::{mpsc, oneshot};

use crate::core::synth::UpdateStatement;
use crate::core::types::{ColumnInfo, DatabaseInfo, QueryOutcome, QueryRequest};
use crate::core::{query, schema};
use crate::error::{AppError, AppResult};

const BUSY_TIMEOUT_MS: u64 = 2_000;

pub const MEMORY_PATH: &str = ":memory:";

/// Cheap to clone; all clones feed the same worker.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: std::sync::mpsc::Sender<DbTask>,
    path: String,
}

impl ConnectionHandle {
    /// Open the database, then hand the connection to a fresh worker thread.
    /// Opening happens on the caller so failures surface here and not as a
    /// drained task queue.
    pub fn open(path: &str, batch_rows: usize) -> AppResult<ConnectionHandle> {
        let conn = open_conn(path)?;
        let (tx, rx) = std::sync::mpsc::channel::<DbTask>();
        thread::spawn(move || worker_main(conn, batch_rows, rx));
        Ok(ConnectionHandle {
            tx,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn database_info(&self) -> DatabaseInfo {
        let name = if self.path == MEMORY_PATH {
            "memory".to_string()
        } else {
            Path::new(&self.path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.clone())
        };
        DatabaseInfo {
            name,
            path: self.path.clone(),
        }
    }

    /// Enqueue a query and return immediately with the outcome receiver.
    /// The worker reports fetched-row counts through `progress` and checks
    /// `cancel` between batches.
    pub fn submit_query(
        &self,
        request: QueryRequest,
        cancel: Arc<AtomicBool>,
        progress: mpsc::Sender<u64>,
    ) -> AppResult<oneshot::Receiver<QueryOutcome>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(DbTask::Query {
                request,
                cancel,
                progress,
                respond_to: tx,
            })
            .map_err(|_| AppError::Connection("database worker is gone".into()))?;
        Ok(rx)
    }

    pub async fn begin(&self) -> AppResult<()> {
        self.request(|tx| DbTask::Begin { respond_to: tx }).await
    }

    pub async fn commit(&self) -> AppResult<()> {
        self.request(|tx| DbTask::Commit { respond_to: tx }).await
    }

    pub async fn rollback(&self) -> AppResult<()> {
        self.request(|tx| DbTask::Rollback { respond_to: tx }).await
    }

    /// Run synthesized updates plus COMMIT as a single worker task, so no
    /// other statement can slip in between them.
    pub async fn apply_and_commit(&self, statements: Vec<UpdateStatement>) -> AppResult<usize> {
        self.request(|tx| DbTask::Apply {
            statements,
            respond_to: tx,
        })
        .await
    }

    pub async fn schemas(&self) -> AppResult<Vec<String>> {
        self.request(|tx| DbTask::Schemas { respond_to: tx }).await
    }

    pub async fn tables(&self, schema: String) -> AppResult<Vec<String>> {
        self.request(|tx| DbTask::Tables {
            schema,
            respond_to: tx,
        })
        .await
    }

    pub async fn columns(&self, schema: String, table: String) -> AppResult<Vec<ColumnInfo>> {
        self.request(|tx| DbTask::Columns {
            schema,
            table,
            respond_to: tx,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<AppResult<T>>) -> DbTask,
    ) -> AppResult<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .map_err(|_| AppError::Connection("database worker is gone".into()))?;
        rx.await
            .map_err(|_| AppError::Connection("database worker dropped the response".into()))?
    }
}

enum DbTask {
    Query {
        request: QueryRequest,
        cancel: Arc<AtomicBool>,
        progress: mpsc::Sender<u64>,
        respond_to: oneshot::Sender<QueryOutcome>,
    },
    Begin {
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Commit {
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Rollback {
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Apply {
        statements: Vec<UpdateStatement>,
        respond_to: oneshot::Sender<AppResult<usize>>,
    },
    Schemas {
        respond_to: oneshot::Sender<AppResult<Vec<String>>>,
    },
    Tables {
        schema: String,
        respond_to: oneshot::Sender<AppResult<Vec<String>>>,
    },
    Columns {
        schema: String,
        table: String,
        respond_to: oneshot::Sender<AppResult<Vec<ColumnInfo>>>,
    },
}

fn worker_main(conn: Connection, batch_rows: usize, rx: std::sync::mpsc::Receiver<DbTask>) {
    tracing::debug!("database worker started");
    while let Ok(task) = rx.recv() {
        match task {
            DbTask::Query {
                request,
                cancel,
                progress,
                respond_to,
            } => {
                let outcome = query::run_statement(&conn, &request, batch_rows, &cancel, &progress);
                let _ = respond_to.send(outcome);
            }
            DbTask::Begin { respond_to } => {
                let res = conn.execute_batch("BEGIN DEFERRED").map_err(AppError::from);
                let _ = respond_to.send(res);
            }
            DbTask::Commit { respond_to } => {
                let res = conn.execute_batch("COMMIT").map_err(AppError::from);
                let _ = respond_to.send(res);
            }
            DbTask::Rollback { respond_to } => {
                let res = conn.execute_batch("ROLLBACK").map_err(AppError::from);
                let _ = respond_to.send(res);
            }
            DbTask::Apply {
                statements,
                respond_to,
            } => {
                let res = query::apply_updates(&conn, &statements);
                let _ = respond_to.send(res);
            }
            DbTask::Schemas { respond_to } => {
                let _ = respond_to.send(schema::list_schemas(&conn));
            }
            DbTask::Tables { schema, respond_to } => {
                let _ = respond_to.send(schema::list_tables(&conn, &schema));
            }
            DbTask::Columns {
                schema,
                table,
                respond_to,
            } => {
                let _ = respond_to.send(schema::list_columns(&conn, &schema, &table));
            }
        }
    }
    tracing::debug!("database worker stopped");
}

fn open_conn(path: &str) -> AppResult<Connection> {
    let conn = if path == MEMORY_PATH {
        Connection::open_in_memory()
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        Connection::open_with_flags(path, flags)
    }
    .map_err(|source| AppError::DbOpenFailed {
        path: path.into(),
        source,
    })?;
    let _ = conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS));
    Ok(conn)
}
