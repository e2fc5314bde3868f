//! Storage collaborator: an embedded read-only analytical store.
//!
//! The analytics database file is ATTACHed under the allowed namespace alias
//! (e.g. `gold`) so generated SQL can reference `gold.fct_daily_uf` the same
//! way the warehouse layers name it. The handle is opened read-only; writes
//! are impossible at the connection level, independently of the SQL guard.

use crate::error::{AgentError, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Raw table metadata as reported by the store.
#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub schema: String,
    pub name: String,
    /// (column name, declared type)
    pub columns: Vec<(String, String)>,
}

/// Columns-and-rows result straight from the store.
#[derive(Debug, Clone)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// The two operations the pipeline needs from the analytical store:
/// schema introspection for a namespace, and execution of one read-only
/// statement. Implementations must be safe for concurrent callers.
pub trait StorageEngine: Send + Sync {
    fn introspect(&self, namespace: &str) -> Result<Vec<RelationInfo>>;

    /// Run a single statement. `params` are bound as named text parameters
    /// (e.g. `$uf`).
    fn query(&self, sql: &str, params: &[(&str, &str)]) -> Result<TabularResult>;
}

/// SQLite-backed store. One connection behind a mutex; readers serialize,
/// which also covers engines that require serialized schema reads.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Attach `db_path` read-only under the `namespace` schema alias.
    pub fn open(db_path: &Path, namespace: &str) -> Result<Self> {
        if !db_path.exists() {
            return Err(AgentError::Introspection(format!(
                "analytics database not found at {}",
                db_path.display()
            )));
        }
        let conn = Connection::open_in_memory()?;
        let uri = format!("file:{}?mode=ro", db_path.display());
        conn.execute("ATTACH DATABASE ?1 AS gold", [&uri])
            .map_err(AgentError::Storage)?;
        // The alias is fixed at attach time; reject mismatched config early.
        if namespace != "gold" {
            return Err(AgentError::Config(format!(
                "unsupported namespace alias '{}'",
                namespace
            )));
        }
        info!(db = %db_path.display(), "attached analytics store read-only");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store with a writable `gold` schema, for fixtures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("ATTACH DATABASE ':memory:' AS gold;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run raw setup SQL (fixture loading only; the pipeline itself never
    /// touches this).
    pub fn setup_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute_batch(sql)?;
        Ok(())
    }
}

fn value_to_json(v: ValueRef<'_>) -> serde_json::Value {
    match v {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

impl StorageEngine for SqliteStore {
    fn introspect(&self, namespace: &str) -> Result<Vec<RelationInfo>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT name FROM {}.sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
                namespace
            ))
            .map_err(|e| AgentError::Introspection(e.to_string()))?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| AgentError::Introspection(e.to_string()))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AgentError::Introspection(e.to_string()))?;

        let mut relations = Vec::with_capacity(names.len());
        for name in names {
            let mut info = conn
                .prepare(&format!("PRAGMA {}.table_info({})", namespace, name))
                .map_err(|e| AgentError::Introspection(e.to_string()))?;
            let columns: Vec<(String, String)> = info
                .query_map([], |row| {
                    Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })
                .map_err(|e| AgentError::Introspection(e.to_string()))?
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| AgentError::Introspection(e.to_string()))?;
            debug!(table = %name, cols = columns.len(), "introspected relation");
            relations.push(RelationInfo {
                schema: namespace.to_string(),
                name,
                columns,
            });
        }
        Ok(relations)
    }

    fn query(&self, sql: &str, params: &[(&str, &str)]) -> Result<TabularResult> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(sql).map_err(|e| AgentError::Execution {
            sql: sql.to_string(),
            message: e.to_string(),
        })?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let bound: Vec<(&str, &dyn rusqlite::ToSql)> = params
            .iter()
            .map(|(k, v)| (*k, v as &dyn rusqlite::ToSql))
            .collect();
        let mut rows = stmt
            .query(&bound[..])
            .map_err(|e| AgentError::Execution {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| AgentError::Execution {
            sql: sql.to_string(),
            message: e.to_string(),
        })? {
            let mut rec = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let v = row.get_ref(idx).map_err(|e| AgentError::Execution {
                    sql: sql.to_string(),
                    message: e.to_string(),
                })?;
                rec.push(value_to_json(v));
            }
            out.push(rec);
        }
        Ok(TabularResult { columns, rows: out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE fct_daily_uf (day TEXT, uf TEXT, cases INTEGER);
             INSERT INTO fct_daily_uf VALUES ('2024-01-01', 'SP', 10);",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn attached_file_is_queryable_under_the_gold_alias() {
        let (_dir, path) = seeded_db_file();
        let store = SqliteStore::open(&path, "gold").unwrap();
        let result = store
            .query("SELECT SUM(cases) AS total FROM gold.fct_daily_uf", &[])
            .unwrap();
        assert_eq!(result.columns, vec!["total"]);
        assert_eq!(result.rows[0][0], serde_json::json!(10));
    }

    #[test]
    fn attached_file_rejects_writes_at_the_connection_level() {
        let (_dir, path) = seeded_db_file();
        let store = SqliteStore::open(&path, "gold").unwrap();
        let err = store
            .query("INSERT INTO gold.fct_daily_uf VALUES ('2024-01-02', 'RJ', 1)", &[])
            .unwrap_err();
        assert!(matches!(err, AgentError::Execution { .. }));
    }

    #[test]
    fn introspection_lists_tables_and_columns() {
        let (_dir, path) = seeded_db_file();
        let store = SqliteStore::open(&path, "gold").unwrap();
        let relations = store.introspect("gold").unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].name, "fct_daily_uf");
        assert_eq!(relations[0].columns.len(), 3);
    }

    #[test]
    fn missing_database_file_is_an_introspection_error() {
        let err = SqliteStore::open(Path::new("/nonexistent/gold.db"), "gold").unwrap_err();
        assert!(matches!(err, AgentError::Introspection(_)));
    }

    #[test]
    fn named_parameters_bind_as_text() {
        let (_dir, path) = seeded_db_file();
        let store = SqliteStore::open(&path, "gold").unwrap();
        let result = store
            .query(
                "SELECT cases FROM gold.fct_daily_uf WHERE uf = $uf",
                &[("$uf", "SP")],
            )
            .unwrap();
        assert_eq!(result.rows.len(), 1);
    }
}
