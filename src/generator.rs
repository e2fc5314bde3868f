//! SQL generation: schema-grounded prompt in, one candidate statement out.
//!
//! This component never judges safety. It only asks a provider for a single
//! statement and extracts statement-shaped text deterministically; whether
//! that text is allowed to run is exclusively the guard's call.

use crate::error::{AgentError, Result};
use crate::intent::Intent;
use crate::prompt::{build_sql_user_prompt, SQL_RETRY_SYSTEM_PROMPT, SQL_SYSTEM_PROMPT};
use crate::provider::{GenerationOptions, ProviderRouter};
use crate::schema::SchemaSnapshot;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

/// Read-only input to generation; never mutated downstream.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub intent: Intent,
    pub user_message: String,
    pub snapshot: SchemaSnapshot,
    pub history: Vec<String>,
}

/// Untrusted provider output. Only the guard can turn this into something
/// executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSql(pub String);

impl CandidateSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:sql)?\s*(.*?)```").unwrap();
    static ref STATEMENT_START: Regex = Regex::new(r"(?im)^\s*(SELECT|WITH)\b").unwrap();
}

/// Strip surrounding prose and markdown fencing from a provider response.
/// Fenced block wins; otherwise the text from the first SELECT/WITH onward.
pub fn extract_statement(response: &str) -> Option<String> {
    let body = match FENCED_BLOCK.captures(response) {
        Some(cap) => cap[1].trim().to_string(),
        None => response.trim().to_string(),
    };
    if body.is_empty() {
        return None;
    }
    let start = STATEMENT_START.find(&body)?;
    let statement = body[start.start()..].trim();
    if statement.is_empty() {
        None
    } else {
        Some(statement.to_string())
    }
}

pub struct SqlGenerator {
    max_tokens: u32,
    timeout: Duration,
}

impl SqlGenerator {
    pub fn new(max_tokens: u32, timeout: Duration) -> Self {
        Self {
            max_tokens,
            timeout,
        }
    }

    /// Ask the router for one statement. On unusable output, re-prompt once
    /// with the stricter system prompt, then fail with `Generation`.
    pub async fn generate_sql(
        &self,
        request: &GenerationRequest,
        router: &ProviderRouter,
    ) -> Result<CandidateSql> {
        let user_prompt =
            build_sql_user_prompt(&request.snapshot, &request.user_message, &request.history);

        let first = self
            .attempt(router, &user_prompt, SQL_SYSTEM_PROMPT)
            .await?;
        if let Some(sql) = extract_statement(&first) {
            debug!(sql = %sql, "extracted candidate SQL");
            return Ok(CandidateSql(sql));
        }

        warn!("no statement-shaped text in first response, re-prompting once");
        let second = self
            .attempt(router, &user_prompt, SQL_RETRY_SYSTEM_PROMPT)
            .await?;
        match extract_statement(&second) {
            Some(sql) => Ok(CandidateSql(sql)),
            None => Err(AgentError::Generation(format!(
                "model output contained no SQL statement: {}",
                second.chars().take(200).collect::<String>()
            ))),
        }
    }

    async fn attempt(
        &self,
        router: &ProviderRouter,
        user_prompt: &str,
        system: &str,
    ) -> Result<String> {
        let opts = GenerationOptions {
            system: system.to_string(),
            max_tokens: self.max_tokens,
            temperature: 0.1,
            timeout: self.timeout,
        };
        router.generate(user_prompt, &opts).await
    }
}
