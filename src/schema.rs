//! Schema snapshot: the compact, versioned table/column description that
//! grounds SQL generation and defines the guard's whitelist.
//!
//! Only the aggregated fact layer (the allowed namespace) is included; raw
//! ingestion tables never appear here, which is what makes the snapshot the
//! single source of truth for the whitelist.

use crate::error::{AgentError, Result};
use crate::storage::StorageEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub allowed: bool,
}

impl TableDescriptor {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Immutable once built for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub namespace: String,
    pub tables: Vec<TableDescriptor>,
}

impl SchemaSnapshot {
    /// Qualified names of tables generated SQL may reference.
    pub fn allowed_tables(&self) -> HashSet<String> {
        self.tables
            .iter()
            .filter(|t| t.allowed)
            .map(|t| t.qualified_name())
            .collect()
    }

    /// Bare table names within the allowed namespace, for resolving
    /// unqualified references.
    pub fn allowed_bare_names(&self) -> HashSet<String> {
        self.tables
            .iter()
            .filter(|t| t.allowed)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Compact textual rendering used to ground generation prompts.
    /// Names, types and short descriptions only; never row data.
    pub fn render_for_prompt(&self) -> String {
        let mut out = String::new();
        for table in self.tables.iter().filter(|t| t.allowed) {
            out.push_str(&format!("TABLE {}\n", table.qualified_name()));
            for col in &table.columns {
                match &col.description {
                    Some(desc) => {
                        out.push_str(&format!("  - {} {} -- {}\n", col.name, col.ty, desc))
                    }
                    None => out.push_str(&format!("  - {} {}\n", col.name, col.ty)),
                }
            }
        }
        out
    }
}

/// Builds a snapshot from the storage collaborator.
pub struct SnapshotBuilder {
    store: Arc<dyn StorageEngine>,
    namespace: String,
}

impl SnapshotBuilder {
    pub fn new(store: Arc<dyn StorageEngine>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn build(&self) -> Result<SchemaSnapshot> {
        let relations = self.store.introspect(&self.namespace)?;
        if relations.is_empty() {
            return Err(AgentError::Introspection(format!(
                "no tables found in namespace '{}'",
                self.namespace
            )));
        }
        let tables = relations
            .into_iter()
            .map(|rel| TableDescriptor {
                schema: rel.schema,
                name: rel.name,
                columns: rel
                    .columns
                    .into_iter()
                    .map(|(name, ty)| ColumnDescriptor {
                        description: column_description(&name),
                        name,
                        ty,
                    })
                    .collect(),
                allowed: true,
            })
            .collect::<Vec<_>>();
        info!(
            namespace = %self.namespace,
            tables = tables.len(),
            "built schema snapshot"
        );
        Ok(SchemaSnapshot {
            namespace: self.namespace.clone(),
            tables,
        })
    }
}

/// Memoized snapshot with explicit, caller-triggered invalidation. Never
/// time-based.
pub struct SnapshotCache {
    builder: SnapshotBuilder,
    cached: Mutex<Option<Arc<SchemaSnapshot>>>,
}

impl SnapshotCache {
    pub fn new(builder: SnapshotBuilder) -> Self {
        Self {
            builder,
            cached: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<SchemaSnapshot>> {
        let mut slot = self.cached.lock().expect("snapshot mutex poisoned");
        if let Some(snapshot) = slot.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(self.builder.build()?);
        *slot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        *self.cached.lock().expect("snapshot mutex poisoned") = None;
    }
}

/// Short PT-BR descriptions for the known fact-layer columns; unknown
/// columns stay undescribed rather than guessed.
fn column_description(name: &str) -> Option<String> {
    let desc = match name {
        "day" => "dia da notificação (DATE)",
        "month" => "mês de referência (DATE, primeiro dia do mês)",
        "uf" => "UF de notificação (sigla de 2 letras)",
        "cases" => "casos notificados no dia",
        "deaths_30d" => "óbitos na janela de 30 dias",
        "closed_cases_30d" => "casos encerrados na janela de 30 dias",
        "icu_cases" => "casos com passagem por UTI",
        "vaccinated_cases" => "casos com vacinação registrada",
        _ => return None,
    };
    Some(desc.to_string())
}
