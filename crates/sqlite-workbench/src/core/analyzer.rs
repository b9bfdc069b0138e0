//! Editability analysis. A result set qualifies for in-place editing only
//! when the statement is a single-table SELECT whose projection is `*` or a
//! plain column list, the FROM target is a base table, the table has a
//! primary key, and every key column is present in the projection under its
//! own name. Everything else is read-only; when in doubt, this module says
//! no and the worst outcome is a grid the user cannot type into.

use serde::Serialize;

use super::lexer::{tokenize, Token};
use super::types::{ColumnInfo, TableRef};

/// Why a result set is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOnlyReason {
    /// Not a plain single-table SELECT (joins, grouping, set operations,
    /// subqueries, computed or aliased projections, DML, ...).
    ComplexStatement,
    /// FROM target is not a base table in the catalog (missing, or a view).
    NotBaseTable,
    NoPrimaryKey,
    /// The table has a key, but the projection hides part of it.
    KeyNotProjected,
}

impl ReadOnlyReason {
    pub fn describe(&self) -> &'static str {
        match self {
            ReadOnlyReason::ComplexStatement => "statement is not a simple single-table SELECT",
            ReadOnlyReason::NotBaseTable => "target is not a base table in this database",
            ReadOnlyReason::NoPrimaryKey => "table has no primary key",
            ReadOnlyReason::KeyNotProjected => "projection does not include the full primary key",
        }
    }
}

/// Outcome of classification, paired with the result set it describes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub editable: bool,
    pub table: Option<TableRef>,
    /// Primary-key column names in key order, catalog spelling.
    pub pk_columns: Vec<String>,
    pub reason: Option<ReadOnlyReason>,
}

impl Verdict {
    pub fn editable(table: TableRef, pk_columns: Vec<String>) -> Verdict {
        Verdict {
            editable: true,
            table: Some(table),
            pk_columns,
            reason: None,
        }
    }

    pub fn read_only(reason: ReadOnlyReason) -> Verdict {
        Verdict {
            editable: false,
            table: None,
            pk_columns: Vec::new(),
            reason: Some(reason),
        }
    }

    fn read_only_for(table: TableRef, reason: ReadOnlyReason) -> Verdict {
        Verdict {
            editable: false,
            table: Some(table),
            pk_columns: Vec::new(),
            reason: Some(reason),
        }
    }
}

/// What the analyzer needs to know about the FROM target. Callers assemble
/// it from catalog metadata for the table the statement names.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    /// True when the name resolves to a base table (not a view, not absent).
    pub base_table: bool,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*` (or `t.*`): every stored column comes through under its own name.
    Star,
    /// Plain column references, unqualified names.
    Columns(Vec<String>),
}

/// The parsed shape of a candidate statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectShape {
    pub table: TableRef,
    pub projection: Projection,
}

pub const DEFAULT_SCHEMA: &str = "main";

// Any of these anywhere in the statement disqualifies it outright. GROUP
// covers GROUP BY; DISTINCT is rejected even as an aggregate qualifier.
const DISQUALIFIERS: &[&str] = &["JOIN", "GROUP", "DISTINCT", "UNION", "INTERSECT", "EXCEPT"];

// Clause keywords that may legally follow the FROM target.
const TRAILING_CLAUSES: &[&str] = &["WHERE", "ORDER", "LIMIT", "OFFSET"];

/// Parse the editable-candidate shape out of a statement. `None` means the
/// statement does not match the conservative grammar.
pub fn select_shape(sql: &str) -> Option<SelectShape> {
    let mut tokens = tokenize(sql);
    while tokens.last() == Some(&Token::Punct(';')) {
        tokens.pop();
    }

    if !tokens.first()?.is_kw("SELECT") {
        return None;
    }
    if tokens
        .iter()
        .any(|t| DISQUALIFIERS.iter().any(|kw| t.is_kw(kw)))
    {
        return None;
    }

    // Exactly one FROM in the whole statement; a second one means a
    // subquery is hiding somewhere.
    let from_positions: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_kw("FROM"))
        .map(|(i, _)| i)
        .collect();
    let [from_idx] = from_positions[..] else {
        return None;
    };

    let projection = parse_projection(&tokens[1..from_idx])?;

    let (table, after) = parse_table_ref(&tokens[from_idx + 1..])?;
    match after {
        None => {}
        Some(tok) if TRAILING_CLAUSES.iter().any(|kw| tok.is_kw(kw)) => {}
        Some(_) => return None,
    }

    Some(SelectShape { table, projection })
}

fn parse_projection(tokens: &[Token]) -> Option<Projection> {
    if tokens.is_empty() {
        return None;
    }

    let mut names = Vec::new();
    let mut star = false;
    for item in split_top_level_commas(tokens) {
        match classify_item(item)? {
            Item::AllColumns => star = true,
            Item::Name(n) => names.push(n),
        }
    }

    if star {
        // Mixing `*` with named columns still projects every stored column.
        Some(Projection::Star)
    } else {
        Some(Projection::Columns(names))
    }
}

enum Item {
    AllColumns,
    Name(String),
}

// `*`, `col`, `t.col`, `t.*` and the quoted forms. Anything longer is an
// expression or an alias and disqualifies the statement.
fn classify_item(item: &[Token]) -> Option<Item> {
    match item {
        [Token::Punct('*')] => Some(Item::AllColumns),
        [t] => t.ident().map(|n| Item::Name(n.to_string())),
        [q, Token::Punct('.'), Token::Punct('*')] if q.ident().is_some() => Some(Item::AllColumns),
        [q, Token::Punct('.'), t] if q.ident().is_some() => {
            t.ident().map(|n| Item::Name(n.to_string()))
        }
        _ => None,
    }
}

fn split_top_level_commas(tokens: &[Token]) -> Vec<&[Token]> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => depth = depth.saturating_sub(1),
            Token::Punct(',') if depth == 0 => {
                items.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&tokens[start..]);
    items
}

fn parse_table_ref(tokens: &[Token]) -> Option<(TableRef, Option<&Token>)> {
    let first = tokens.first()?;
    if TRAILING_CLAUSES.iter().any(|kw| first.is_kw(kw)) {
        return None;
    }
    let first_name = first.ident()?;

    if tokens.get(1) == Some(&Token::Punct('.')) {
        let second_name = tokens.get(2)?.ident()?;
        Some((TableRef::new(first_name, second_name), tokens.get(3)))
    } else {
        Some((TableRef::new(DEFAULT_SCHEMA, first_name), tokens.get(1)))
    }
}

/// Phase two: judge a parsed shape against catalog facts. SQLite resolves
/// identifiers ASCII-case-insensitively and so does this.
pub fn verdict(shape: &SelectShape, snapshot: &TableSnapshot) -> Verdict {
    if !snapshot.base_table {
        return Verdict::read_only_for(shape.table.clone(), ReadOnlyReason::NotBaseTable);
    }

    let mut keyed: Vec<&ColumnInfo> = snapshot
        .columns
        .iter()
        .filter(|c| c.is_primary_key())
        .collect();
    keyed.sort_by_key(|c| c.pk_position);
    if keyed.is_empty() {
        return Verdict::read_only_for(shape.table.clone(), ReadOnlyReason::NoPrimaryKey);
    }
    let pk_columns: Vec<String> = keyed.iter().map(|c| c.name.clone()).collect();

    if let Projection::Columns(names) = &shape.projection {
        let covered = pk_columns
            .iter()
            .all(|pk| names.iter().any(|n| n.eq_ignore_ascii_case(pk)));
        if !covered {
            return Verdict::read_only_for(shape.table.clone(), ReadOnlyReason::KeyNotProjected);
        }
    }

    Verdict::editable(shape.table.clone(), pk_columns)
}

/// Full classification. Pure in (sql, snapshot): same inputs, same verdict.
/// The snapshot must describe the table the statement names.
pub fn classify(sql: &str, snapshot: &TableSnapshot) -> Verdict {
    match select_shape(sql) {
        Some(shape) => verdict(&shape, snapshot),
        None => Verdict::read_only(ReadOnlyReason::ComplexStatement),
    }
}
