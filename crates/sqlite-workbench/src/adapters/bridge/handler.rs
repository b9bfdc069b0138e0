use tokio::sync::mpsc;

use crate::{
    cli::Args,
    core::{
        coordinator::Submission,
        events::EventSender,
        grid::EditStatus,
        session::Session,
        types::{QueryOutcome, SubmissionId},
    },
    error::{AppError, AppResult},
};

use super::protocol::*;

/// Feedback routed from per-query forwarder tasks back onto the control
/// loop, where the session lives.
#[derive(Debug)]
pub enum ControlMsg {
    Progress { id: SubmissionId, rows: u64 },
    Completed { id: SubmissionId, outcome: QueryOutcome },
}

pub struct BridgeHandler {
    args: Args,
    session: Option<Session>,
    events: EventSender,
    ctrl: mpsc::UnboundedSender<ControlMsg>,
}

impl BridgeHandler {
    pub fn new(args: Args, events: EventSender, ctrl: mpsc::UnboundedSender<ControlMsg>) -> Self {
        Self {
            args,
            session: None,
            events,
            ctrl,
        }
    }

    /// Open the database named on the command line, if any.
    pub fn open_startup_database(&mut self) -> AppResult<()> {
        if let Some(path) = self.args.database.clone() {
            self.session = Some(Session::open(
                &path,
                self.args.session_config(),
                self.events.clone(),
            )?);
        }
        Ok(())
    }

    pub async fn handle(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        if req.v != PROTOCOL_VERSION {
            let e = AppError::InvalidRequest(format!("unsupported protocol version: {}", req.v));
            return err(req, &e);
        }

        match req.cmd.as_str() {
            "open" => self.handle_open(req),
            "query" => self.handle_query(req).await,
            "cancel" => self.handle_cancel(req),
            "stage_edit" => self.handle_stage_edit(req),
            "edits" => self.handle_edits(req),
            "begin" => self.handle_begin(req).await,
            "commit" => self.handle_commit(req).await,
            "rollback" => self.handle_rollback(req).await,
            "status" => self.handle_status(req),
            "databases" => self.handle_databases(req),
            "schemas" => self.handle_schemas(req).await,
            "tables" => self.handle_tables(req).await,
            "columns" => self.handle_columns(req).await,
            "all_tables" => self.handle_all_tables(req).await,
            "all_columns" => self.handle_all_columns(req).await,
            "table_select" => self.handle_table_select(req).await,
            other => {
                let e = AppError::InvalidRequest(format!("unknown cmd: {other}"));
                err(req, &e)
            }
        }
    }

    /// Apply feedback from a forwarder task. Outcomes for sessions that have
    /// since been replaced are dropped silently.
    pub async fn apply_control(&mut self, msg: ControlMsg) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match msg {
            ControlMsg::Progress { id, rows } => session.note_progress(id, rows),
            ControlMsg::Completed { id, outcome } => {
                if let Err(e) = session.complete(id, outcome).await {
                    tracing::error!(id = %id, error = %e, "query completion failed");
                }
            }
        }
    }

    fn session_mut(&mut self) -> AppResult<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| AppError::InvalidRequest("no open database; send open first".into()))
    }

    fn handle_open(&mut self, mut req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let p: OpenPayload = match parse_payload(req.payload.take()) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        match Session::open(&p.path, self.args.session_config(), self.events.clone()) {
            Ok(session) => {
                let database = session.status().database;
                self.session = Some(session);
                ok(req, serde_json::json!({ "database": database }))
            }
            Err(e) => err(req, &e),
        }
    }

    async fn handle_query(&mut self, mut req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let p: QueryPayload = match parse_payload(req.payload.take()) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.submit_query(&p.sql, p.limit).await {
            Ok(submission) => {
                let id = submission.id;
                forward_submission(submission, self.ctrl.clone());
                ok(req, serde_json::json!({ "id": id }))
            }
            Err(e) => err(req, &e),
        }
    }

    fn handle_cancel(&mut self, mut req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let p: CancelPayload = match parse_payload(req.payload.take()) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        let cancelled = session.cancel(p.id.map(SubmissionId));
        ok(req, serde_json::json!({ "cancelled": cancelled }))
    }

    fn handle_stage_edit(&mut self, mut req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let p: StageEditPayload = match parse_payload(req.payload.take()) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        let input = match edit_input(&p.value) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.stage_edit(p.row, p.col, input.as_deref()) {
            Ok(EditStatus::Staged) => ok(req, serde_json::json!({ "result": "staged" })),
            Ok(EditStatus::Reverted) => ok(req, serde_json::json!({ "result": "reverted" })),
            Err(e) => err(req, &e),
        }
    }

    fn handle_edits(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        let edits = session.staged_edits();
        let verdict = session.grid().map(|g| g.verdict().clone());
        ok(req, serde_json::json!({ "edits": edits, "verdict": verdict }))
    }

    async fn handle_begin(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.begin().await {
            Ok(()) => ok(req, serde_json::Value::Bool(true)),
            Err(e) => err(req, &e),
        }
    }

    async fn handle_commit(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.commit().await {
            Ok(applied) => ok(req, serde_json::json!({ "applied": applied })),
            Err(e) => err(req, &e),
        }
    }

    async fn handle_rollback(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.rollback().await {
            Ok(()) => ok(req, serde_json::Value::Bool(true)),
            Err(e) => err(req, &e),
        }
    }

    fn handle_status(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        ok(req, to_json(&session.status()))
    }

    fn handle_databases(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        ok(req, to_json(&session.metadata().databases()))
    }

    async fn handle_schemas(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.metadata().schemas().await {
            Ok(schemas) => ok(req, to_json(&schemas)),
            Err(e) => err(req, &e),
        }
    }

    async fn handle_tables(&mut self, mut req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let p: TablesPayload = match parse_payload(req.payload.take()) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        let schema = p.schema.as_deref().unwrap_or("main");
        match session.metadata().tables(schema).await {
            Ok(tables) => ok(req, to_json(&tables)),
            Err(e) => err(req, &e),
        }
    }

    async fn handle_columns(&mut self, mut req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let p: ColumnsPayload = match parse_payload(req.payload.take()) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        let schema = p.schema.as_deref().unwrap_or("main");
        match session.metadata().columns(schema, &p.table).await {
            Ok(columns) => ok(req, to_json(&columns)),
            Err(e) => err(req, &e),
        }
    }

    async fn handle_all_tables(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.metadata().all_tables().await {
            Ok(tables) => ok(req, to_json(&tables)),
            Err(e) => err(req, &e),
        }
    }

    async fn handle_all_columns(&mut self, req: BridgeRequest) -> BridgeResponse<serde_json::Value> {
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        match session.metadata().all_columns().await {
            Ok(columns) => ok(req, to_json(&columns)),
            Err(e) => err(req, &e),
        }
    }

    async fn handle_table_select(
        &mut self,
        mut req: BridgeRequest,
    ) -> BridgeResponse<serde_json::Value> {
        let p: TableSelectPayload = match parse_payload(req.payload.take()) {
            Ok(v) => v,
            Err(e) => return err(req, &e),
        };
        let session = match self.session_mut() {
            Ok(s) => s,
            Err(e) => return err(req, &e),
        };
        let schema = p.schema.as_deref().unwrap_or("main");
        match session.table_statement(schema, &p.table).await {
            Ok(sql) => ok(req, serde_json::json!({ "sql": sql })),
            Err(e) => err(req, &e),
        }
    }
}

/// Pump a submission's progress stream, then its terminal outcome, into the
/// control channel. Keeping the progress receiver drained for the whole
/// fetch is what lets the worker keep moving; the outcome is read only after
/// the stream closes, so progress lines always precede the completion.
fn forward_submission(mut submission: Submission, ctrl: mpsc::UnboundedSender<ControlMsg>) {
    tokio::spawn(async move {
        while let Some(rows) = submission.progress.recv().await {
            let _ = ctrl.send(ControlMsg::Progress {
                id: submission.id,
                rows,
            });
        }
        let outcome = match submission.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => QueryOutcome::Failure {
                message: "connection worker exited before reporting".to_string(),
                position: None,
            },
        };
        let _ = ctrl.send(ControlMsg::Completed {
            id: submission.id,
            outcome,
        });
    });
}

fn edit_input(value: &serde_json::Value) -> AppResult<Option<String>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        serde_json::Value::Bool(b) => Ok(Some(b.to_string())),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(AppError::InvalidRequest(format!(
            "unsupported edit value: {other}"
        ))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|_| serde_json::Value::Null)
}

fn ok(req: BridgeRequest, data: serde_json::Value) -> BridgeResponse<serde_json::Value> {
    BridgeResponse::ok(req.id, data)
}

fn err(req: BridgeRequest, e: &AppError) -> BridgeResponse<serde_json::Value> {
    BridgeResponse::err(req.id, e)
}
