//! Pipeline orchestration: one entrypoint per user-facing operation, each
//! composing the same fixed stages in the same order:
//! classify -> snapshot -> generate -> validate -> execute.
//!
//! No stage is ever skipped for SQL-bearing intents, and nothing reaches the
//! executor without passing the guard (the type system enforces that part).

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::executor::{QueryExecutor, QueryResult};
use crate::generator::{CandidateSql, GenerationRequest, SqlGenerator};
use crate::glossary::glossary_lookup;
use crate::guard::{SqlGuard, ValidatedSql};
use crate::intent::{extract_explain_term, Classification, Intent, IntentClassifier, Scope};
use crate::provider::ProviderRouter;
use crate::queries;
use crate::schema::{SnapshotBuilder, SnapshotCache};
use crate::storage::StorageEngine;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// What the caller gets back: either a table (SQL path) or ready-to-print
/// Markdown text (conversational paths).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Answer {
    Table { result: QueryResult },
    Text { text: String },
}

impl Answer {
    /// Render any answer as Markdown text for terminal output.
    pub fn to_markdown(&self) -> String {
        match self {
            Answer::Text { text } => text.clone(),
            Answer::Table { result } => render_table(result),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    pub intent: Intent,
    pub answer: Answer,
}

fn render_table(result: &QueryResult) -> String {
    if result.rows.is_empty() {
        return "Nenhuma linha encontrada para essa consulta.".to_string();
    }
    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&result.columns.join(" | "));
    out.push_str(" |\n|");
    for _ in &result.columns {
        out.push_str("---|");
    }
    out.push('\n');
    for row in &result.rows {
        out.push_str("| ");
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::Null => "-".to_string(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
    }
    out
}

fn greet_message() -> String {
    "Olá! Eu sou o agente SRAG. Posso:\n\
     - Responder **perguntas quantitativas** sobre os dados — ex.: *\"quantos casos tivemos em SP nos últimos 30 dias?\"*\n\
     - **Explicar** métricas e termos — ex.: *\"o que é CFR?\"*\n\
     - Comentar **tendências** (últimos 7 vs. 7 anteriores)\n\
     - **Comparar** UFs por casos ou CFR\n\n\
     Como posso ajudar agora?"
        .to_string()
}

pub struct Pipeline {
    config: AgentConfig,
    router: ProviderRouter,
    classifier: IntentClassifier,
    generator: SqlGenerator,
    guard: SqlGuard,
    executor: QueryExecutor,
    snapshots: SnapshotCache,
}

impl Pipeline {
    pub fn new(config: AgentConfig, store: Arc<dyn StorageEngine>) -> Self {
        let router = ProviderRouter::from_config(&config);
        Self::with_router(config, store, router)
    }

    /// Same wiring with an explicit router, so tests can inject scripted
    /// providers.
    pub fn with_router(
        config: AgentConfig,
        store: Arc<dyn StorageEngine>,
        router: ProviderRouter,
    ) -> Self {
        let classifier = IntentClassifier::new(config.use_model_intent, config.provider_timeout);
        let generator = SqlGenerator::new(config.max_tokens, config.provider_timeout);
        let guard = SqlGuard::new(config.row_limit_default, config.row_limit_max);
        let executor = QueryExecutor::new(store.clone());
        let snapshots = SnapshotCache::new(SnapshotBuilder::new(
            store,
            config.allowed_namespace.clone(),
        ));
        Self {
            config,
            router,
            classifier,
            generator,
            guard,
            executor,
            snapshots,
        }
    }

    /// Full two-tier classification only; no generation, no execution. The
    /// model tier still honors the feature flag and provider availability.
    pub async fn classify_intent(&self, message: &str) -> Result<Classification> {
        self.classifier.classify(message, &self.router).await
    }

    /// Validate caller-supplied SQL without executing it.
    pub fn validate_only(&self, sql: &str) -> Result<ValidatedSql> {
        let snapshot = self.snapshots.get()?;
        self.guard
            .validate(&CandidateSql(sql.to_string()), &snapshot)
            .map_err(AgentError::Rejected)
    }

    /// Drop the cached schema snapshot after a mart refresh.
    pub fn refresh_schema(&self) {
        self.snapshots.invalidate();
    }

    /// Main entrypoint: route a free-form message to the right feature and
    /// answer it. Conversational intents never touch a provider.
    pub async fn natural_language_query(
        &self,
        message: &str,
        history: &[String],
    ) -> Result<PipelineOutcome> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let classification = self.classifier.classify(message, &self.router).await?;
        let intent = classification.intent;
        info!(
            request_id = %request_id,
            intent = intent.as_str(),
            confidence = classification.confidence,
            "classified"
        );

        let answer = match intent {
            Intent::Greet => Answer::Text {
                text: greet_message(),
            },
            Intent::Chitchat => Answer::Text {
                text: "De nada! Se quiser, pergunte sobre casos, tendências ou métricas de SRAG."
                    .to_string(),
            },
            Intent::Explain | Intent::DataQa => Answer::Text {
                text: glossary_lookup(&extract_explain_term(message)),
            },
            Intent::News => Answer::Text {
                text: "Busca de notícias não está habilitada neste agente. Posso responder \
                       perguntas sobre os dados de SRAG, explicar métricas ou comentar tendências."
                    .to_string(),
            },
            Intent::Report => Answer::Text {
                text: "O relatório padrão é gerado pelo serviço de relatórios, não por este \
                       agente. Aqui posso responder perguntas pontuais sobre os dados."
                    .to_string(),
            },
            Intent::Trend => Answer::Text {
                text: self.trend_comment(&classification)?,
            },
            Intent::Compare => Answer::Table {
                result: self.ranking(&classification)?,
            },
            Intent::NlQuery => Answer::Table {
                result: self.generated_query(message, history, intent).await?,
            },
            // Unknown is a terminal outcome, not a license to guess SQL.
            Intent::Unknown => Answer::Text {
                text: "Não entendi bem. Você pode fazer uma **pergunta quantitativa** sobre os \
                       dados, pedir a **explicação** de um termo, **tendências** ou **comparar** \
                       UFs."
                    .to_string(),
            },
        };

        info!(
            request_id = %request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request answered"
        );
        Ok(PipelineOutcome {
            request_id,
            intent,
            answer,
        })
    }

    /// Data question entrypoint: glossary first, SQL path as fallback,
    /// always rendered as text.
    pub async fn answer_data_question(&self, message: &str) -> Result<String> {
        let term = extract_explain_term(message);
        let text = glossary_lookup(&term);
        if !text.contains("não encontrado") {
            return Ok(text);
        }
        let result = self.generated_query(message, &[], Intent::DataQa).await?;
        Ok(render_table(&result))
    }

    /// Short PT trend comment from the canned daily series: last 7 days vs
    /// the 7 before. No provider involved.
    pub fn trend_comment(&self, classification: &Classification) -> Result<String> {
        let result = match classification.hints.scope {
            Scope::Br => self.canned(queries::SQL_DAILY_30D_BR, &[])?,
            Scope::Uf => {
                let uf = classification.hints.uf.as_deref().unwrap_or("BR");
                self.canned(queries::SQL_DAILY_30D_UF, &[("$uf", uf)])?
            }
        };

        let daily: Vec<f64> = result
            .rows
            .iter()
            .filter_map(|row| row.get(1).and_then(|v| v.as_f64()))
            .collect();
        let trend = if daily.len() >= 14 {
            let last_7: f64 = daily[daily.len() - 7..].iter().sum();
            let prev_7: f64 = daily[daily.len() - 14..daily.len() - 7].iter().sum();
            if prev_7 > 0.0 {
                Some(100.0 * (last_7 - prev_7) / prev_7)
            } else {
                None
            }
        } else {
            None
        };

        let place = match classification.hints.uf.as_deref() {
            Some(uf) => format!("**{}**", uf),
            None => "**Brasil**".to_string(),
        };
        let mut msg = format!("**Tendência (últimos 7 vs. 7 anteriores)** em {}: ", place);
        match trend {
            Some(pct) => msg.push_str(&format!("{:.1}%.", pct)),
            None => msg.push_str("indisponível."),
        }
        msg.push_str(&format!("\nPontos diários: {}.", daily.len()));
        Ok(msg)
    }

    /// Ranking of states, by CFR when the message asked for it, by cases
    /// otherwise. Canned SQL, no provider involved.
    fn ranking(&self, classification: &Classification) -> Result<QueryResult> {
        match classification.hints.metric.as_deref() {
            Some("cfr_30d_closed") => self.canned(queries::SQL_CFR_UF_90D, &[]),
            _ => self.canned(queries::SQL_TOP_UF_CASES_30D, &[]),
        }
    }

    /// KPI bundle for the current 30d window plus 7d growth, BR or UF scope.
    pub fn kpis(&self, uf: Option<&str>) -> Result<(QueryResult, QueryResult)> {
        let (growth, kpis) = match uf {
            None => (
                self.canned(queries::SQL_GROWTH_7D_BR, &[])?,
                self.canned(queries::SQL_KPIS_30D_BR, &[])?,
            ),
            Some(uf) => (
                self.canned(queries::SQL_GROWTH_7D_UF, &[("$uf", uf)])?,
                self.canned(queries::SQL_KPIS_30D_UF, &[("$uf", uf)])?,
            ),
        };
        Ok((growth, kpis))
    }

    /// Canned statements go through the same guard as generated ones.
    fn canned(&self, sql: &str, params: &[(&str, &str)]) -> Result<QueryResult> {
        let snapshot = self.snapshots.get()?;
        let validated = self
            .guard
            .validate(&CandidateSql(sql.to_string()), &snapshot)
            .map_err(AgentError::Rejected)?;
        self.executor.execute_with_params(&validated, params)
    }

    /// The full generate -> validate -> execute path for quantitative
    /// questions.
    async fn generated_query(
        &self,
        message: &str,
        history: &[String],
        intent: Intent,
    ) -> Result<QueryResult> {
        if self.router.is_empty() {
            return Err(AgentError::Config(
                "no generation provider configured; set OPENAI_API_KEY or GROQ_API_KEY".into(),
            ));
        }
        let snapshot = self.snapshots.get()?;
        let request = GenerationRequest {
            intent,
            user_message: message.to_string(),
            snapshot: (*snapshot).clone(),
            history: history.to_vec(),
        };

        let stage = Instant::now();
        let candidate = self.generator.generate_sql(&request, &self.router).await?;
        info!(
            elapsed_ms = stage.elapsed().as_millis() as u64,
            "sql generated"
        );

        let validated = match self.guard.validate(&candidate, &snapshot) {
            Ok(validated) => validated,
            Err(reason) => {
                warn!(sql = candidate.as_str(), reason = %reason, "candidate rejected");
                return Err(AgentError::Rejected(reason));
            }
        };
        self.executor.execute(&validated)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}
