use thiserror::Error;

/// Why the SQL guard refused a candidate statement.
///
/// These are surfaced verbatim to the caller; the pipeline never retries a
/// rejected statement with a "fixed" variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("more than one SQL statement in candidate")]
    MultiStatement,

    #[error("statement is not a read query (found '{0}')")]
    NonSelect(String),

    #[error("table '{0}' is not whitelisted")]
    TableNotWhitelisted(String),

    #[error("could not enforce row limit: {0}")]
    LimitInjectionFailed(String),
}

/// One failed attempt inside the provider router.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("schema introspection failed: {0}")]
    Introspection(String),

    #[error("all generation providers failed ({} attempted)", .failures.len())]
    AllProvidersExhausted {
        failures: Vec<(String, ProviderError)>,
    },

    #[error("no usable SQL in model output: {0}")]
    Generation(String),

    #[error("query rejected: {0}")]
    Rejected(#[from] RejectionReason),

    #[error("execution failed for `{sql}`: {message}")]
    Execution { sql: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Per-provider breakdown for an `AllProvidersExhausted` failure.
    pub fn provider_failures(&self) -> Option<&[(String, ProviderError)]> {
        match self {
            AgentError::AllProvidersExhausted { failures } => Some(failures),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
