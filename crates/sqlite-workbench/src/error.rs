use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to open database: {path}: {source}")]
    DbOpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The worker thread is gone or dropped its responder. Fatal for the
    /// session; the caller has to reopen.
    #[error("connection lost: {0}")]
    Connection(String),

    #[error("sql error: {message}")]
    Query {
        message: String,
        /// Byte offset of the failing token when SQLite reports one.
        position: Option<usize>,
    },

    #[error("edit rejected: {0}")]
    EditRejected(#[from] EditReject),

    /// The commit pass aborted and the transaction was rolled back.
    /// `statement` is the index of the failing update, or `None` when the
    /// COMMIT itself failed.
    #[error("commit failed: {message}")]
    CommitFailed {
        statement: Option<usize>,
        message: String,
    },

    #[error("cannot {op} while transaction is {state}")]
    TxnState { op: &'static str, state: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Why a cell edit was refused. Staging is validated before anything touches
/// the database, so these all surface synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditReject {
    #[error("result set is not editable")]
    NotEditable,

    #[error("column \"{column}\" is part of the primary key")]
    PrimaryKey { column: String },

    #[error("cell ({row}, {col}) is outside the result set")]
    OutOfRange { row: usize, col: usize },

    #[error("{input:?} is not a valid {category} value")]
    TypeMismatch { input: String, category: &'static str },
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqlInputError { msg, offset, .. } => AppError::Query {
                message: msg,
                position: (offset >= 0).then_some(offset as usize),
            },
            other => AppError::Query {
                message: other.to_string(),
                position: None,
            },
        }
    }
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::DbOpenFailed { .. } => "DB_OPEN_FAILED",
            AppError::Connection(_) => "CONNECTION",
            AppError::Query { .. } => "SQL_ERROR",
            AppError::EditRejected(_) => "EDIT_REJECTED",
            AppError::CommitFailed { .. } => "COMMIT_FAILED",
            AppError::TxnState { .. } => "TXN_STATE",
            AppError::Io(_) => "IO_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Internal(_) => "INTERNAL",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
