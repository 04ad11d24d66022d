//! # Datastore Module
//!
//! Storage collaborator for leaf handlers. The dispatch core never touches
//! it; handlers that need state receive an `Arc<dyn Datastore>`.
//!
//! Tables are flat: a row is a map from column name to JSON value, every
//! column is required, and any subset of columns can be declared unique.
//!
//! ```rust
//! use brrtdispatch::datastore::{ColumnKind, ColumnSpec, Datastore, MemoryDatastore, Row};
//! use serde_json::json;
//!
//! let store = MemoryDatastore::new();
//! store.start()?;
//! store.create_table(
//!     "pets",
//!     &["name"],
//!     &[ColumnSpec::new("name", ColumnKind::Text), ColumnSpec::new("age", ColumnKind::Integer)],
//! )?;
//! store.add_row("pets", Row::from([("name".into(), json!("rex")), ("age".into(), json!(3))]))?;
//!
//! let found = store.get_row("pets", &["age"], &Row::from([("name".into(), json!("rex"))]))?;
//! assert_eq!(found.and_then(|r| r.get("age").cloned()), Some(json!(3)));
//! # Ok::<(), brrtdispatch::error::DatastoreError>(())
//! ```

use crate::error::DatastoreError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// One stored row: column name to value.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Integer,
    Boolean,
    /// Any JSON value
    Json,
}

impl ColumnKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ColumnKind::Text => value.is_string(),
            ColumnKind::Integer => value.is_i64() || value.is_u64(),
            ColumnKind::Boolean => value.is_boolean(),
            ColumnKind::Json => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "an integer",
            ColumnKind::Boolean => "a boolean",
            ColumnKind::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Pluggable table storage used by handlers.
pub trait Datastore: Send + Sync {
    fn start(&self) -> Result<(), DatastoreError>;

    /// Stop serving requests. A non-graceful stop also discards contents
    /// where the backend allows it.
    fn stop(&self, graceful: bool);

    fn is_stopped(&self) -> bool;

    /// Whether one instance may be shared between worker threads.
    fn is_thread_safe(&self) -> bool;

    fn create_table(
        &self,
        name: &str,
        unique_columns: &[&str],
        column_specs: &[ColumnSpec],
    ) -> Result<(), DatastoreError>;

    fn table_exists(&self, name: &str) -> bool;

    fn delete_table(&self, name: &str) -> Result<(), DatastoreError>;

    fn add_row(&self, table: &str, row: Row) -> Result<(), DatastoreError>;

    /// First row whose values equal every entry of `match_criteria`,
    /// restricted to `projected_fields` (all columns when empty).
    fn get_row(
        &self,
        table: &str,
        projected_fields: &[&str],
        match_criteria: &Row,
    ) -> Result<Option<Row>, DatastoreError>;
}

#[derive(Debug)]
struct Table {
    columns: Vec<ColumnSpec>,
    unique: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// In-memory [`Datastore`]. Created stopped; call [`Datastore::start`].
#[derive(Debug)]
pub struct MemoryDatastore {
    tables: DashMap<String, Table>,
    stopped: AtomicBool,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self {
            tables: DashMap::new(),
            stopped: AtomicBool::new(true),
        }
    }
}

impl MemoryDatastore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_running(&self) -> Result<(), DatastoreError> {
        if self.is_stopped() {
            Err(DatastoreError::Stopped)
        } else {
            Ok(())
        }
    }
}

impl Datastore for MemoryDatastore {
    fn start(&self) -> Result<(), DatastoreError> {
        if self.stopped.swap(false, Ordering::AcqRel) {
            info!(tables = self.tables.len(), "Memory datastore started");
        }
        Ok(())
    }

    fn stop(&self, graceful: bool) {
        self.stopped.store(true, Ordering::Release);
        if !graceful {
            self.tables.clear();
        }
        info!(graceful, "Memory datastore stopped");
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn create_table(
        &self,
        name: &str,
        unique_columns: &[&str],
        column_specs: &[ColumnSpec],
    ) -> Result<(), DatastoreError> {
        self.ensure_running()?;
        if let Some(missing) = unique_columns
            .iter()
            .find(|u| !column_specs.iter().any(|c| c.name == **u))
        {
            return Err(DatastoreError::UnknownColumn {
                table: name.to_string(),
                column: (*missing).to_string(),
            });
        }

        match self.tables.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(DatastoreError::TableExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Table {
                    columns: column_specs.to_vec(),
                    unique: unique_columns.iter().map(|u| (*u).to_string()).collect(),
                    rows: Vec::new(),
                });
                debug!(table = name, columns = column_specs.len(), "Table created");
                Ok(())
            }
        }
    }

    fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn delete_table(&self, name: &str) -> Result<(), DatastoreError> {
        self.ensure_running()?;
        if self.tables.remove(name).is_none() {
            return Err(DatastoreError::NoSuchTable(name.to_string()));
        }
        debug!(table = name, "Table deleted");
        Ok(())
    }

    fn add_row(&self, table: &str, row: Row) -> Result<(), DatastoreError> {
        self.ensure_running()?;
        let mut entry = self
            .tables
            .get_mut(table)
            .ok_or_else(|| DatastoreError::NoSuchTable(table.to_string()))?;

        for (column, value) in &row {
            let spec = entry
                .column(column)
                .ok_or_else(|| DatastoreError::UnknownColumn {
                    table: table.to_string(),
                    column: column.clone(),
                })?;
            if !spec.kind.accepts(value) {
                return Err(DatastoreError::TypeMismatch {
                    table: table.to_string(),
                    column: column.clone(),
                    expected: spec.kind.describe(),
                });
            }
        }
        if let Some(missing) = entry.columns.iter().find(|c| !row.contains_key(&c.name)) {
            return Err(DatastoreError::MissingColumn {
                table: table.to_string(),
                column: missing.name.clone(),
            });
        }
        for column in &entry.unique {
            let value = &row[column];
            if entry.rows.iter().any(|r| r.get(column) == Some(value)) {
                return Err(DatastoreError::UniqueViolation {
                    table: table.to_string(),
                    column: column.clone(),
                    value: value.to_string(),
                });
            }
        }

        entry.rows.push(row);
        Ok(())
    }

    fn get_row(
        &self,
        table: &str,
        projected_fields: &[&str],
        match_criteria: &Row,
    ) -> Result<Option<Row>, DatastoreError> {
        self.ensure_running()?;
        let entry = self
            .tables
            .get(table)
            .ok_or_else(|| DatastoreError::NoSuchTable(table.to_string()))?;

        for field in projected_fields.iter().copied().chain(match_criteria.keys().map(String::as_str)) {
            if entry.column(field).is_none() {
                return Err(DatastoreError::UnknownColumn {
                    table: table.to_string(),
                    column: field.to_string(),
                });
            }
        }

        let found = entry
            .rows
            .iter()
            .find(|row| match_criteria.iter().all(|(k, v)| row.get(k) == Some(v)));

        Ok(found.map(|row| {
            if projected_fields.is_empty() {
                row.clone()
            } else {
                row.iter()
                    .filter(|(k, _)| projected_fields.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            }
        }))
    }
}
