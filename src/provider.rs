//! Text-generation providers and ordered fallback routing.
//!
//! All providers speak the OpenAI-compatible chat-completions wire format;
//! identity and order come from configuration, never from runtime string
//! dispatch. A provider is tried at most once per request; retries across the
//! same provider belong to the caller.

use crate::config::{AgentConfig, ProviderKind, ProviderSettings};
use crate::error::{AgentError, ProviderError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub system: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Independent timeout per provider attempt.
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            system: String::new(),
            max_tokens: 1200,
            temperature: 0.2,
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        opts: &GenerationOptions,
    ) -> std::result::Result<String, ProviderError>;
}

/// Shared chat-completions client for OpenAI-compatible endpoints.
struct ChatClient {
    id: String,
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl ChatClient {
    fn new(id: &str, settings: &ProviderSettings) -> Self {
        Self {
            id: id.to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
            http: reqwest::Client::new(),
        }
    }

    async fn chat(
        &self,
        prompt: &str,
        opts: &GenerationOptions,
    ) -> std::result::Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": opts.system},
                {"role": "user", "content": prompt}
            ],
            "temperature": opts.temperature,
            "max_tokens": opts.max_tokens
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Request(e.to_string())
                }
            })?;

        match response.status().as_u16() {
            401 | 403 => return Err(ProviderError::Auth(response.status().to_string())),
            429 => return Err(ProviderError::RateLimited(response.status().to_string())),
            code if code >= 400 => {
                return Err(ProviderError::Request(format!("HTTP {}", code)));
            }
            _ => {}
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("no content in response".to_string()))?;
        Ok(content.trim().to_string())
    }
}

pub struct OpenAiProvider {
    client: ChatClient,
}

impl OpenAiProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: ChatClient::new("openai", settings),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.client.id
    }

    async fn generate(
        &self,
        prompt: &str,
        opts: &GenerationOptions,
    ) -> std::result::Result<String, ProviderError> {
        self.client.chat(prompt, opts).await
    }
}

pub struct GroqProvider {
    client: ChatClient,
}

impl GroqProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: ChatClient::new("groq", settings),
        }
    }
}

#[async_trait]
impl Provider for GroqProvider {
    fn id(&self) -> &str {
        &self.client.id
    }

    async fn generate(
        &self,
        prompt: &str,
        opts: &GenerationOptions,
    ) -> std::result::Result<String, ProviderError> {
        self.client.chat(prompt, opts).await
    }
}

/// Ordered fallback over the configured providers.
///
/// Either one provider succeeds fully or the call fails with the last error
/// per provider; no partial results.
pub struct ProviderRouter {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRouter {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Build from config; providers without credentials were already dropped
    /// when the config was loaded.
    pub fn from_config(config: &AgentConfig) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|settings| -> Box<dyn Provider> {
                match settings.kind {
                    ProviderKind::OpenAi => Box::new(OpenAiProvider::new(settings)),
                    ProviderKind::Groq => Box::new(GroqProvider::new(settings)),
                }
            })
            .collect();
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub async fn generate(&self, prompt: &str, opts: &GenerationOptions) -> Result<String> {
        let mut failures: Vec<(String, ProviderError)> = Vec::new();

        for provider in &self.providers {
            let attempt = tokio::time::timeout(opts.timeout, provider.generate(prompt, opts));
            match attempt.await {
                Ok(Ok(text)) => {
                    info!(provider = provider.id(), "generation succeeded");
                    return Ok(text);
                }
                Ok(Err(err)) => {
                    warn!(provider = provider.id(), error = %err, "provider failed, trying next");
                    failures.push((provider.id().to_string(), err));
                }
                Err(_) => {
                    warn!(provider = provider.id(), "provider timed out, trying next");
                    failures.push((provider.id().to_string(), ProviderError::Timeout));
                }
            }
        }

        Err(AgentError::AllProvidersExhausted { failures })
    }
}
