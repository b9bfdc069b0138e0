//! Update synthesis. Staged edits become one parameterized UPDATE per
//! edited row, in ascending row order. The WHERE clause always equates the
//! key to the values that came back with the fetch, never to anything
//! staged since, so a row is only ever rewritten where it was read.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::grid::{ResultGrid, StagedEdit};
use crate::core::types::{quote_ident, Value};
use crate::error::{AppError, AppResult};

/// One synthesized statement with its bind parameters in placeholder order.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Turn the grid's staged edits into per-row updates. Empty when nothing is
/// staged. Errors only on grids the session never hands over: read-only or
/// keyless ones.
pub fn synthesize(grid: &ResultGrid) -> AppResult<Vec<UpdateStatement>> {
    if !grid.has_edits() {
        return Ok(Vec::new());
    }
    let verdict = grid.verdict();
    let table = match (&verdict.table, verdict.editable) {
        (Some(table), true) => table,
        _ => {
            return Err(AppError::Internal(
                "edits staged on a read-only result set".into(),
            ))
        }
    };
    if grid.pk_indices().is_empty() {
        return Err(AppError::Internal("editable verdict without a key".into()));
    }

    let mut by_row: BTreeMap<usize, Vec<&StagedEdit>> = BTreeMap::new();
    for edit in grid.edits() {
        by_row.entry(edit.row).or_default().push(edit);
    }

    let columns = grid.columns();
    let mut statements = Vec::with_capacity(by_row.len());
    for (row, edits) in by_row {
        let mut params = Vec::with_capacity(edits.len() + grid.pk_indices().len());

        let assignments: Vec<String> = edits
            .iter()
            .map(|edit| {
                params.push(edit.value.clone());
                format!("{} = ?", quote_ident(&columns[edit.col].name))
            })
            .collect();

        let conditions: Vec<String> = grid
            .pk_indices()
            .iter()
            .map(|&idx| {
                let fetched = grid
                    .original_at(row, idx)
                    .cloned()
                    .unwrap_or(Value::Null);
                params.push(fetched);
                format!("{} = ?", quote_ident(&columns[idx].name))
            })
            .collect();

        statements.push(UpdateStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                table.quoted(),
                assignments.join(", "),
                conditions.join(" AND ")
            ),
            params,
        });
    }

    Ok(statements)
}
