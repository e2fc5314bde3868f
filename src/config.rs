//! Agent configuration, built once from the environment at startup.
//!
//! Environment variables:
//! - `OPENAI_API_KEY` / `OPENAI_MODEL` (default: gpt-4o-mini)
//! - `GROQ_API_KEY` / `GROQ_MODEL` (default: llama-3.3-70b-versatile)
//! - `SRAG_DB_PATH` (default: data/srag.db)
//! - `SRAG_USE_MODEL_INTENT` ("1"/"true" enables the model-assisted tier)
//! - `SRAG_ROW_LIMIT_DEFAULT` (default: 500)
//! - `SRAG_ROW_LIMIT_MAX` (default: 5000)
//! - `SRAG_PROVIDER_TIMEOUT_SECS` (default: 30)
//!
//! A provider without a key is dropped from the candidate list here, at
//! startup, never at call time.

use crate::error::{AgentError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Only the aggregated fact layer is exposed to generated SQL.
pub const ALLOWED_NAMESPACE: &str = "gold";

pub const DEFAULT_ROW_LIMIT: u32 = 500;
pub const MAX_ROW_LIMIT: u32 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Groq,
}

/// Credentials and model selection for one generation backend.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Process-wide, read-only after `from_env`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Providers in fallback priority order.
    pub providers: Vec<ProviderSettings>,
    pub use_model_intent: bool,
    pub row_limit_default: u32,
    pub row_limit_max: u32,
    pub storage_location: PathBuf,
    pub allowed_namespace: String,
    pub provider_timeout: Duration,
    pub max_tokens: u32,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AgentError::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).unwrap_or_default().trim(),
        "1" | "true" | "yes" | "on"
    )
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        // Best effort; a missing .env file is fine.
        let _ = dotenv::dotenv();

        let mut providers = Vec::new();
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                providers.push(ProviderSettings {
                    kind: ProviderKind::OpenAi,
                    api_key: key,
                    model: std::env::var("OPENAI_MODEL")
                        .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                    base_url: std::env::var("OPENAI_BASE_URL")
                        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                });
            }
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            if !key.trim().is_empty() {
                providers.push(ProviderSettings {
                    kind: ProviderKind::Groq,
                    api_key: key,
                    model: std::env::var("GROQ_MODEL")
                        .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
                    base_url: std::env::var("GROQ_BASE_URL")
                        .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
                });
            }
        }

        let row_limit_default = env_parse("SRAG_ROW_LIMIT_DEFAULT", DEFAULT_ROW_LIMIT)?;
        let row_limit_max = env_parse("SRAG_ROW_LIMIT_MAX", MAX_ROW_LIMIT)?;
        if row_limit_default == 0 || row_limit_default > row_limit_max {
            return Err(AgentError::Config(format!(
                "row limit default {} must be in 1..={}",
                row_limit_default, row_limit_max
            )));
        }

        Ok(Self {
            providers,
            use_model_intent: env_flag("SRAG_USE_MODEL_INTENT"),
            row_limit_default,
            row_limit_max,
            storage_location: PathBuf::from(
                std::env::var("SRAG_DB_PATH").unwrap_or_else(|_| "data/srag.db".to_string()),
            ),
            allowed_namespace: ALLOWED_NAMESPACE.to_string(),
            provider_timeout: Duration::from_secs(env_parse("SRAG_PROVIDER_TIMEOUT_SECS", 30u64)?),
            max_tokens: 1200,
        })
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            use_model_intent: false,
            row_limit_default: DEFAULT_ROW_LIMIT,
            row_limit_max: MAX_ROW_LIMIT,
            storage_location: PathBuf::from("data/srag.db"),
            allowed_namespace: ALLOWED_NAMESPACE.to_string(),
            provider_timeout: Duration::from_secs(30),
            max_tokens: 1200,
        }
    }
}
