use super::lexer::tokenize;
use super::types::QueryRequest;

/// Clamp a per-request limit into [1, max_rows].
pub fn effective_limit(requested: Option<usize>, max_rows: usize) -> usize {
    requested.unwrap_or(max_rows).min(max_rows).max(1)
}

/// Build the worker-ready request: trailing semicolons stripped, and a
/// limit-less SELECT gets exactly one ` LIMIT {n}` appended. Anything that is
/// not a plain SELECT (INSERT, CTEs, PRAGMA, ...) passes through untouched.
pub fn prepare_request(sql: &str, requested: Option<usize>, max_rows: usize) -> QueryRequest {
    let limit = effective_limit(requested, max_rows);
    let stripped = strip_trailing_semicolons(sql);
    let tokens = tokenize(stripped);

    let is_select = tokens.first().map(|t| t.is_kw("SELECT")).unwrap_or(false);
    let has_limit = tokens.iter().any(|t| t.is_kw("LIMIT"));

    if is_select && !has_limit {
        QueryRequest {
            sql: format!("{stripped} LIMIT {limit}"),
            limit,
            auto_limited: true,
        }
    } else {
        QueryRequest {
            sql: stripped.to_string(),
            limit,
            auto_limited: false,
        }
    }
}

fn strip_trailing_semicolons(sql: &str) -> &str {
    let mut s = sql.trim();
    while let Some(rest) = s.strip_suffix(';') {
        s = rest.trim_end();
    }
    s
}
