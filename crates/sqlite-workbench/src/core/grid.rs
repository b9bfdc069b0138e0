//! The in-memory result set plus its staged-edit overlay. Fetched values
//! stay immutable; edits live beside them keyed by (row, col) and only the
//! synthesizer and the overlay readers look at both. A cell edited back to
//! its fetched value drops out of the overlay entirely.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::analyzer::Verdict;
use crate::core::types::{ColumnDescriptor, TypeCategory, Value};
use crate::error::EditReject;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedEdit {
    pub row: usize,
    pub col: usize,
    pub value: Value,
    /// The fetched value the edit replaces.
    pub original: Value,
}

/// What `stage_edit` did with an accepted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStatus {
    Staged,
    /// The input equals the fetched value; any pending edit was dropped.
    Reverted,
}

pub struct ResultGrid {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<Value>>,
    truncated: bool,
    verdict: Verdict,
    /// Indices of the verdict's key columns within `columns`.
    pk_indices: Vec<usize>,
    edits: BTreeMap<(usize, usize), StagedEdit>,
}

impl ResultGrid {
    /// Bind a verdict to the rows it describes. If a key column is somehow
    /// absent from the fetched columns the grid demotes itself to read-only
    /// rather than synthesize an unkeyed update later.
    pub fn new(
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Vec<Value>>,
        truncated: bool,
        verdict: Verdict,
    ) -> ResultGrid {
        let (verdict, pk_indices) = match resolve_key_indices(&columns, &verdict) {
            Some(indices) => (verdict, indices),
            None => (
                Verdict {
                    editable: false,
                    ..verdict
                },
                Vec::new(),
            ),
        };
        ResultGrid {
            columns,
            rows,
            truncated,
            verdict,
            pk_indices,
            edits: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    pub fn pk_indices(&self) -> &[usize] {
        &self.pk_indices
    }

    /// The fetched value, untouched by edits.
    pub fn original_at(&self, row: usize, col: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// The value as displayed: staged edit if present, else fetched.
    pub fn value_at(&self, row: usize, col: usize) -> Option<&Value> {
        match self.edits.get(&(row, col)) {
            Some(edit) => Some(&edit.value),
            None => self.original_at(row, col),
        }
    }

    /// Validate and stage one cell edit. `input` of `None` stages NULL for
    /// any category; column constraints get their say at commit time.
    pub fn stage_edit(
        &mut self,
        row: usize,
        col: usize,
        input: Option<&str>,
    ) -> Result<EditStatus, EditReject> {
        if !self.verdict.editable {
            return Err(EditReject::NotEditable);
        }
        if row >= self.rows.len() || col >= self.columns.len() {
            return Err(EditReject::OutOfRange { row, col });
        }
        if self.pk_indices.contains(&col) {
            return Err(EditReject::PrimaryKey {
                column: self.columns[col].name.clone(),
            });
        }

        let value = coerce(input, self.columns[col].category)?;
        let original = &self.rows[row][col];
        if value == *original {
            self.edits.remove(&(row, col));
            return Ok(EditStatus::Reverted);
        }

        self.edits.insert(
            (row, col),
            StagedEdit {
                row,
                col,
                value,
                original: original.clone(),
            },
        );
        Ok(EditStatus::Staged)
    }

    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.len()
    }

    /// Staged edits in (row, col) ascending order.
    pub fn edits(&self) -> impl Iterator<Item = &StagedEdit> {
        self.edits.values()
    }

    pub fn clear_edits(&mut self) {
        self.edits.clear();
    }
}

fn resolve_key_indices(columns: &[ColumnDescriptor], verdict: &Verdict) -> Option<Vec<usize>> {
    if !verdict.editable {
        return Some(Vec::new());
    }
    verdict
        .pk_columns
        .iter()
        .map(|pk| {
            columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(pk))
        })
        .collect()
}

/// Interpret raw input under a column category. Booleans accept the
/// tri-state spellings; integer and float must parse; text and other take
/// the input verbatim.
fn coerce(input: Option<&str>, category: TypeCategory) -> Result<Value, EditReject> {
    let Some(text) = input else {
        return Ok(Value::Null);
    };
    match category {
        TypeCategory::Boolean => {
            if text.eq_ignore_ascii_case("true") {
                Ok(Value::Integer(1))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Value::Integer(0))
            } else if text.eq_ignore_ascii_case("null") {
                Ok(Value::Null)
            } else {
                Err(mismatch(text, category))
            }
        }
        TypeCategory::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| mismatch(text, category)),
        TypeCategory::Float => text
            .trim()
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| mismatch(text, category)),
        TypeCategory::Text | TypeCategory::Other => Ok(Value::Text(text.to_string())),
    }
}

fn mismatch(input: &str, category: TypeCategory) -> EditReject {
    EditReject::TypeMismatch {
        input: input.to_string(),
        category: category.as_str(),
    }
}
