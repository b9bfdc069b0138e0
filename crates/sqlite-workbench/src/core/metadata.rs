//! Lazily populated catalog cache. Listings are fetched from the worker on
//! first use and then served from memory until `invalidate`; the session
//! invalidates after DDL, anything else (another process writing the file)
//! is stale by choice.

use std::collections::{BTreeSet, HashMap};

use crate::core::analyzer::TableSnapshot;
use crate::core::connection::ConnectionHandle;
use crate::core::types::{ColumnInfo, DatabaseInfo, TableRef};
use crate::error::AppResult;

pub struct MetadataCache {
    handle: ConnectionHandle,
    databases: Vec<DatabaseInfo>,
    schemas: Option<Vec<String>>,
    tables: HashMap<String, Vec<String>>,
    columns: HashMap<(String, String), Vec<ColumnInfo>>,
}

impl MetadataCache {
    pub fn new(handle: ConnectionHandle) -> MetadataCache {
        let databases = vec![handle.database_info()];
        MetadataCache {
            handle,
            databases,
            schemas: None,
            tables: HashMap::new(),
            columns: HashMap::new(),
        }
    }

    /// The embedded engine serves exactly one database, the open file.
    pub fn databases(&self) -> &[DatabaseInfo] {
        &self.databases
    }

    pub async fn schemas(&mut self) -> AppResult<&[String]> {
        if self.schemas.is_none() {
            self.schemas = Some(self.handle.schemas().await?);
        }
        Ok(self.schemas.as_deref().unwrap_or_default())
    }

    pub async fn tables(&mut self, schema: &str) -> AppResult<&[String]> {
        if !self.tables.contains_key(schema) {
            let list = self.handle.tables(schema.to_string()).await?;
            self.tables.insert(schema.to_string(), list);
        }
        Ok(self
            .tables
            .get(schema)
            .map(|v| v.as_slice())
            .unwrap_or_default())
    }

    pub async fn columns(&mut self, schema: &str, table: &str) -> AppResult<&[ColumnInfo]> {
        let key = (schema.to_string(), table.to_string());
        if !self.columns.contains_key(&key) {
            let list = self
                .handle
                .columns(schema.to_string(), table.to_string())
                .await?;
            self.columns.insert(key.clone(), list);
        }
        Ok(self
            .columns
            .get(&key)
            .map(|v| v.as_slice())
            .unwrap_or_default())
    }

    /// What the analyzer needs to know about one FROM target. Name lookup is
    /// ASCII-case-insensitive, like SQLite's own.
    pub async fn snapshot(&mut self, table: &TableRef) -> AppResult<TableSnapshot> {
        let base_table = self
            .tables(&table.schema)
            .await?
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&table.table));
        let columns = if base_table {
            self.columns(&table.schema, &table.table).await?.to_vec()
        } else {
            Vec::new()
        };
        Ok(TableSnapshot {
            base_table,
            columns,
        })
    }

    /// Every base table across every attached schema, for completion feeds.
    pub async fn all_tables(&mut self) -> AppResult<Vec<TableRef>> {
        let schemas = self.schemas().await?.to_vec();
        let mut out = Vec::new();
        for schema in schemas {
            for table in self.tables(&schema).await? {
                out.push(TableRef::new(schema.clone(), table.clone()));
            }
        }
        Ok(out)
    }

    /// Distinct column names across the whole database, sorted.
    pub async fn all_columns(&mut self) -> AppResult<Vec<String>> {
        let tables = self.all_tables().await?;
        let mut names = BTreeSet::new();
        for t in &tables {
            for col in self.columns(&t.schema, &t.table).await? {
                names.insert(col.name.clone());
            }
        }
        Ok(names.into_iter().collect())
    }

    pub fn invalidate(&mut self) {
        self.schemas = None;
        self.tables.clear();
        self.columns.clear();
    }
}
