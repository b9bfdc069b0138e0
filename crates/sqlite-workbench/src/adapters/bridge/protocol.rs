use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::events::EngineEvent;
use crate::error::AppError;

pub const PROTOCOL_VERSION: u32 = 1;

/// One request line on stdin: `{"v":1,"id":"...","cmd":"...","payload":{...}}`.
#[derive(Debug, Deserialize)]
pub struct BridgeRequest {
    pub v: u32,
    pub id: String,
    pub cmd: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One response line on stdout, correlated by `id`.
#[derive(Debug, Serialize)]
pub struct BridgeResponse<T> {
    pub v: u32,
    pub id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl<T> BridgeResponse<T> {
    pub fn ok(id: String, data: T) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id,
            status: "ok",
            data: Some(data),
            error: None,
            code: None,
            details: None,
        }
    }

    pub fn err(id: String, e: &AppError) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id,
            status: "error",
            data: None,
            error: Some(e.to_string()),
            code: Some(e.code()),
            details: error_details(e),
        }
    }

    /// Response for a line that was not parseable as a request at all.
    /// There is no id to echo back, so an empty one goes out.
    pub fn unparsable(e: &serde_json::Error) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: String::new(),
            status: "error",
            data: None,
            error: Some(format!("malformed request: {e}")),
            code: Some("INVALID_REQUEST"),
            details: None,
        }
    }
}

fn error_details(e: &AppError) -> Option<serde_json::Value> {
    match e {
        AppError::Query {
            position: Some(p), ..
        } => Some(serde_json::json!({ "position": p })),
        AppError::CommitFailed {
            statement: Some(n), ..
        } => Some(serde_json::json!({ "statement": n })),
        _ => None,
    }
}

/// Unsolicited event line on stdout. The event's own serde tag carries the
/// discriminant, so the wire shape is `{"v":1,"event":"...",...}`.
#[derive(Debug, Serialize)]
pub struct EventLine<'a> {
    pub v: u32,
    #[serde(flatten)]
    pub event: &'a EngineEvent,
}

impl<'a> EventLine<'a> {
    pub fn new(event: &'a EngineEvent) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            event,
        }
    }
}

pub fn parse_payload<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(payload)
        .map_err(|e| AppError::InvalidRequest(format!("bad payload: {e}")))
}

// Payloads

#[derive(Debug, Deserialize)]
pub struct OpenPayload {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    pub sql: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CancelPayload {
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct StageEditPayload {
    pub row: usize,
    pub col: usize,
    /// JSON null (or an absent field) stages SQL NULL. Strings, numbers
    /// and booleans are coerced against the column's declared type.
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TablesPayload {
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnsPayload {
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

#[derive(Debug, Deserialize)]
pub struct TableSelectPayload {
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SubmissionId;

    #[test]
    fn request_with_default_payload() {
        let req: BridgeRequest =
            serde_json::from_str(r#"{"v":1,"id":"r1","cmd":"status"}"#).expect("parse");
        assert_eq!(req.v, 1);
        assert_eq!(req.cmd, "status");
        assert!(req.payload.is_null());
    }

    #[test]
    fn ok_response_skips_error_fields() {
        let resp = BridgeResponse::ok("r1".to_string(), serde_json::json!({ "n": 3 }));
        let line = serde_json::to_string(&resp).expect("serialize");
        assert!(line.contains(r#""status":"ok""#));
        assert!(!line.contains("error"));
        assert!(!line.contains("code"));
    }

    #[test]
    fn err_response_carries_code_and_position() {
        let e = AppError::Query {
            message: "near \"FROM\": syntax error".to_string(),
            position: Some(12),
        };
        let resp = BridgeResponse::<serde_json::Value>::err("r2".to_string(), &e);
        let line = serde_json::to_string(&resp).expect("serialize");
        assert!(line.contains(r#""code":"SQL_ERROR""#));
        assert!(line.contains(r#""position":12"#));
    }

    #[test]
    fn stage_edit_payload_defaults_value_to_null() {
        let p: StageEditPayload = serde_json::from_str(r#"{"row":0,"col":1}"#).expect("parse");
        assert!(p.value.is_null());
    }

    #[test]
    fn event_line_flattens_event_tag() {
        let event = EngineEvent::QueryStarted {
            id: SubmissionId(7),
        };
        let line = serde_json::to_string(&EventLine::new(&event)).expect("serialize");
        assert!(line.contains(r#""v":1"#));
        assert!(line.contains(r#""event":"query_started""#));
    }
}
