use std::fmt;

use rusqlite::types::{ToSqlOutput, ValueRef};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One fetched cell. Values are kept in SQLite's own storage classes so that
/// staged edits and synthesized update parameters bind without loss.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn from_sqlite(v: ValueRef<'_>) -> Value {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

// Scalars serialize as plain JSON; blobs as a tagged object so clients can
// tell them from text.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => {
                let mut hex = String::with_capacity(b.len() * 2);
                for byte in b {
                    use fmt::Write;
                    let _ = write!(hex, "{byte:02x}");
                }
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("$type", "blob")?;
                map.serialize_entry("hex", &hex)?;
                map.serialize_entry("size", &b.len())?;
                map.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

/// Edit-time interpretation of a column, derived from its declared type with
/// SQLite's affinity keywords. Drives input coercion in the result grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Boolean,
    Integer,
    Float,
    Text,
    Other,
}

impl TypeCategory {
    /// Affinity-style match on the declared type. BOOL wins before INT so
    /// "BOOLEAN" does not land in Integer; NUMERIC/DECIMAL edit as floats.
    pub fn from_decl_type(decl: Option<&str>) -> TypeCategory {
        let Some(decl) = decl else {
            return TypeCategory::Other;
        };
        let upper = decl.to_ascii_uppercase();
        if upper.contains("BOOL") {
            TypeCategory::Boolean
        } else if upper.contains("INT") {
            TypeCategory::Integer
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|k| upper.contains(k)) {
            TypeCategory::Text
        } else if ["REAL", "FLOA", "DOUB", "NUME", "DECI"]
            .iter()
            .any(|k| upper.contains(k))
        {
            TypeCategory::Float
        } else {
            TypeCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::Boolean => "boolean",
            TypeCategory::Integer => "integer",
            TypeCategory::Float => "float",
            TypeCategory::Text => "text",
            TypeCategory::Other => "other",
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column of a fetched result set.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub decl_type: Option<String>,
    pub category: TypeCategory,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, decl_type: Option<String>) -> ColumnDescriptor {
        let category = TypeCategory::from_decl_type(decl_type.as_deref());
        ColumnDescriptor {
            name: name.into(),
            decl_type,
            category,
        }
    }
}

/// A statement as handed to the worker: text already carries the appended
/// LIMIT when the auto-limit rule applied.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    pub limit: usize,
    pub auto_limited: bool,
}

/// Terminal result of exactly one submission.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows {
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Vec<Value>>,
        row_count: usize,
        /// The fetch stopped at the row cap with more rows available.
        truncated: bool,
    },
    Affected {
        rows: u64,
        last_insert_rowid: Option<i64>,
    },
    Cancelled,
    Failure {
        message: String,
        position: Option<usize>,
    },
}

/// Identifies one query submission. Monotonically increasing per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// A database known to the session. An embedded engine has exactly one,
/// the open file; attached schemas are listed separately.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub path: String,
}

/// A cataloged column as reported by table_info.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: Option<String>,
    pub category: TypeCategory,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it.
    pub pk_position: u32,
}

impl ColumnInfo {
    pub fn is_primary_key(&self) -> bool {
        self.pk_position > 0
    }
}

/// Schema-qualified table name, case preserved as written or cataloged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> TableRef {
        TableRef {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// `"schema"."table"`, ready to splice into SQL.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
