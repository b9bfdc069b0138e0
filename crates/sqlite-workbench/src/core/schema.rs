//! Catalog queries, run on the worker thread against the live connection.
//! Every listing is schema-qualified so attached databases behave exactly
//! like `main`.

use rusqlite::{Connection, Row};

use crate::core::types::{quote_ident, ColumnInfo, TypeCategory};
use crate::error::AppResult;

/// Attached schema names in attachment order: `main`, `temp` if populated,
/// then ATTACHed databases.
pub fn list_schemas(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Base tables of one schema, sorted by name. Views are deliberately absent:
/// nothing downstream may treat a view as an edit target.
pub fn list_tables(conn: &Connection, schema: &str) -> AppResult<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Columns of one table in declaration order, with primary-key ordinals.
/// An unknown table yields an empty list, the same as PRAGMA itself.
pub fn list_columns(conn: &Connection, schema: &str, table: &str) -> AppResult<Vec<ColumnInfo>> {
    // PRAGMA arguments are not parameterizable; quoting makes the names safe.
    let sql = format!(
        "PRAGMA {}.table_info({})",
        quote_ident(schema),
        quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let cols = stmt
        .query_map([], |row: &Row<'_>| {
            let name: String = row.get("name")?;
            let decl_type: Option<String> = row.get("type")?;
            let decl_type = decl_type.filter(|t| !t.is_empty());
            let not_null: bool = row.get::<_, i64>("notnull")? != 0;
            let default: Option<String> = row.get("dflt_value")?;
            let pk_position: u32 = row.get::<_, i64>("pk")?.try_into().unwrap_or(0);
            Ok(ColumnInfo {
                name,
                category: TypeCategory::from_decl_type(decl_type.as_deref()),
                decl_type,
                not_null,
                default,
                pk_position,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}
