//! Relational storage sessions.
//!
//! Stages only ever replace whole tables; there is no append or merge mode.

use crate::core::{Dataset, Value};
use crate::errors::StorageError;
use parking_lot::{Mutex, RwLock};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A storage session shared by the stages of one run.
pub trait Storage: Send + Sync + Debug {
    /// Replaces `name` with the contents of `dataset`.
    fn write_table(&self, name: &str, dataset: &Dataset) -> Result<(), StorageError>;

    /// Reads the full contents of `name`.
    fn read_table(&self, name: &str) -> Result<Dataset, StorageError>;

    /// Returns true if `name` exists.
    fn table_exists(&self, name: &str) -> Result<bool, StorageError>;
}

/// Opens one storage session per pipeline run.
///
/// The session is released when the last handle to it is dropped, which
/// happens when the run's context is discarded.
pub trait StorageConnector: Send + Sync + Debug {
    /// Acquires a session.
    fn connect(&self) -> Result<Arc<dyn Storage>, StorageError>;
}

/// An in-process table store.
///
/// Clones share the same tables, so a `MemoryStorage` acts as its own
/// connector and state survives across runs like a real database would.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<HashMap<String, Dataset>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all stored tables, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Storage for MemoryStorage {
    fn write_table(&self, name: &str, dataset: &Dataset) -> Result<(), StorageError> {
        if dataset.columns().is_empty() {
            return Err(StorageError::EmptySchema(name.to_string()));
        }
        self.tables
            .write()
            .insert(name.to_string(), dataset.clone().renamed(name));
        Ok(())
    }

    fn read_table(&self, name: &str) -> Result<Dataset, StorageError> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.tables.read().contains_key(name))
    }
}

impl StorageConnector for MemoryStorage {
    fn connect(&self) -> Result<Arc<dyn Storage>, StorageError> {
        Ok(Arc::new(self.clone()))
    }
}

/// A SQLite-backed storage session.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) a database file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::Connect(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Connect(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: SqlValue, table: &str, column: &str) -> Result<Value, StorageError> {
    match value {
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Integer(n) => Ok(Value::Int(n)),
        SqlValue::Real(f) => Ok(Value::Float(f)),
        SqlValue::Text(s) => Ok(Value::Text(s)),
        SqlValue::Blob(_) => Err(StorageError::UnsupportedValue {
            table: table.to_string(),
            column: column.to_string(),
        }),
    }
}

impl Storage for SqliteStorage {
    fn write_table(&self, name: &str, dataset: &Dataset) -> Result<(), StorageError> {
        if dataset.columns().is_empty() {
            return Err(StorageError::EmptySchema(name.to_string()));
        }

        let table = quote_ident(name);
        let columns: Vec<String> = dataset.columns().iter().map(|c| quote_ident(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {table}"), [])?;
        tx.execute(&format!("CREATE TABLE {table} ({})", columns.join(", ")), [])?;
        {
            let mut insert = tx.prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))?;
            for row in dataset.rows() {
                insert.execute(rusqlite::params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        tx.commit()?;

        debug!(table = %name, rows = dataset.len(), "Replaced table");
        Ok(())
    }

    fn read_table(&self, name: &str) -> Result<Dataset, StorageError> {
        if !self.table_exists(name)? {
            return Err(StorageError::TableNotFound(name.to_string()));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name)))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let raw_rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                raw.into_iter()
                    .zip(&columns)
                    .map(|(v, column)| from_sql(v, name, column))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dataset::from_rows(name, columns, rows)?)
    }

    fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Opens a fresh [`SqliteStorage`] connection to a database file for every run.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    /// Creates a connector for the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageConnector for SqliteConnector {
    fn connect(&self) -> Result<Arc<dyn Storage>, StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connect(e.to_string()))?;
        }
        Ok(Arc::new(SqliteStorage::open(&self.path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(name: &str) -> Dataset {
        Dataset::from_rows(
            name,
            ["order_id", "product_id", "quantity", "price"],
            vec![
                vec![1.into(), "p1".into(), 2.into(), 9.5.into()],
                vec![2.into(), "p2".into(), Value::Null, 3.0.into()],
            ],
        )
        .unwrap()
    }

    fn check_replace_semantics(storage: &dyn Storage) {
        storage.write_table("orders", &sample("orders")).unwrap();
        storage.write_table("orders", &sample("orders")).unwrap();

        let read = storage.read_table("orders").unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read, sample("orders"));
        assert!(storage.table_exists("orders").unwrap());
        assert!(!storage.table_exists("final_data").unwrap());
        assert!(matches!(
            storage.read_table("final_data"),
            Err(StorageError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_memory_storage_replaces_tables() {
        check_replace_semantics(&MemoryStorage::new());
    }

    #[test]
    fn test_sqlite_storage_replaces_tables() {
        check_replace_semantics(&SqliteStorage::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_replace_changes_schema() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.write_table("t", &sample("t")).unwrap();

        let narrow = Dataset::from_rows("t", ["id"], vec![vec![7.into()]]).unwrap();
        storage.write_table("t", &narrow).unwrap();

        assert_eq!(storage.read_table("t").unwrap(), narrow);
    }

    #[test]
    fn test_sqlite_blob_column_is_unsupported() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .conn
            .lock()
            .execute_batch("CREATE TABLE raw (id INTEGER, payload BLOB); INSERT INTO raw VALUES (1, x'00ff');")
            .unwrap();

        let err = storage.read_table("raw").unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedValue { ref column, .. } if column == "payload"
        ));
    }

    #[test]
    fn test_empty_schema_rejected() {
        let empty = Dataset::new("t", Vec::<String>::new());
        assert!(matches!(
            SqliteStorage::open_in_memory().unwrap().write_table("t", &empty),
            Err(StorageError::EmptySchema(_))
        ));
    }

    #[test]
    fn test_sqlite_connector_persists_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(dir.path().join("nested").join("etl.db"));

        connector.connect().unwrap().write_table("orders", &sample("orders")).unwrap();
        let second = connector.connect().unwrap();
        assert_eq!(second.read_table("orders").unwrap().len(), 2);
    }

    #[test]
    fn test_memory_connector_shares_tables() {
        let storage = MemoryStorage::new();
        storage.connect().unwrap().write_table("inventory", &sample("x")).unwrap();

        assert_eq!(storage.table_names(), vec!["inventory".to_string()]);
        assert_eq!(storage.read_table("inventory").unwrap().name(), "inventory");
    }
}
