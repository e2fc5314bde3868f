//! Query execution against the analytical store.
//!
//! The executor's signature is the enforcement point for the guard: it only
//! accepts `ValidatedSql`, a type nothing outside the guard can construct.

use crate::error::{AgentError, Result};
use crate::guard::ValidatedSql;
use crate::storage::StorageEngine;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Tabular result plus the exact statement that produced it, for logging
/// and for echoing back to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub executed_sql: String,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, for single-value aggregates.
    pub fn scalar(&self) -> Option<&serde_json::Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

pub struct QueryExecutor {
    store: Arc<dyn StorageEngine>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn StorageEngine>) -> Self {
        Self { store }
    }

    pub fn execute(&self, sql: &ValidatedSql) -> Result<QueryResult> {
        self.execute_with_params(sql, &[])
    }

    /// Run a validated statement with named parameters (`$uf` style). Storage
    /// failures come back as `Execution` carrying the offending statement.
    pub fn execute_with_params(
        &self,
        sql: &ValidatedSql,
        params: &[(&str, &str)],
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let table = self.store.query(sql.sql(), params).map_err(|err| {
            warn!(sql = %sql, error = %err, "query failed");
            AgentError::Execution {
                sql: sql.sql().to_string(),
                message: err.to_string(),
            }
        })?;
        debug!(
            rows = table.rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query executed"
        );
        Ok(QueryResult {
            columns: table.columns,
            rows: table.rows,
            executed_sql: sql.sql().to_string(),
        })
    }
}
