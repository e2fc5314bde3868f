pub mod config;
pub mod error;
pub mod executor;
pub mod generator;
pub mod glossary;
pub mod guard;
pub mod intent;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod queries;
pub mod schema;
pub mod storage;

pub use config::AgentConfig;
pub use error::{AgentError, ProviderError, RejectionReason, Result};
pub use executor::{QueryExecutor, QueryResult};
pub use generator::{CandidateSql, SqlGenerator};
pub use guard::{SqlGuard, ValidatedSql};
pub use intent::{Classification, Intent, IntentClassifier};
pub use pipeline::{Answer, Pipeline, PipelineOutcome};
pub use provider::{Provider, ProviderRouter};
pub use schema::{SchemaSnapshot, SnapshotBuilder, SnapshotCache};
pub use storage::{SqliteStore, StorageEngine, TabularResult};
