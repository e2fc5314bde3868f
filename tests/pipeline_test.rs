//! End-to-end pipeline tests over an in-memory gold mart and scripted
//! providers. No network, no real credentials.

use async_trait::async_trait;
use chrono::NaiveDate;
use srag_agent::config::AgentConfig;
use srag_agent::error::{AgentError, ProviderError, RejectionReason};
use srag_agent::intent::Intent;
use srag_agent::pipeline::{Answer, Pipeline};
use srag_agent::provider::{GenerationOptions, Provider, ProviderRouter};
use srag_agent::storage::SqliteStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct ScriptedProvider {
    id: String,
    response: Result<String, ProviderError>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }
    async fn generate(
        &self,
        _prompt: &str,
        _opts: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

struct HangingProvider {
    id: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Provider for HangingProvider {
    fn id(&self) -> &str {
        &self.id
    }
    async fn generate(
        &self,
        _prompt: &str,
        _opts: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// 35 days of daily facts for SP and RJ, plus the monthly rollup table.
fn gold_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut batch = String::from(
        "CREATE TABLE gold.fct_daily_uf (
           day TEXT, uf TEXT, cases INTEGER, deaths_30d INTEGER,
           closed_cases_30d INTEGER, icu_cases INTEGER, vaccinated_cases INTEGER
         );
         CREATE TABLE gold.fct_monthly_uf (month TEXT, uf TEXT, cases INTEGER);",
    );
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    for offset in 0..35 {
        let day = start + chrono::Days::new(offset);
        // SP runs hotter than RJ so rankings are deterministic.
        batch.push_str(&format!(
            "INSERT INTO gold.fct_daily_uf VALUES ('{day}', 'SP', {}, 1, 8, 2, 5);
             INSERT INTO gold.fct_daily_uf VALUES ('{day}', 'RJ', {}, 0, 4, 1, 3);",
            10 + offset,
            5
        ));
    }
    batch.push_str(
        "INSERT INTO gold.fct_monthly_uf VALUES ('2024-03-01', 'SP', 400);
         INSERT INTO gold.fct_monthly_uf VALUES ('2024-03-01', 'RJ', 160);",
    );
    store.setup_batch(&batch).unwrap();
    Arc::new(store)
}

fn config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.provider_timeout = Duration::from_millis(50);
    config
}

fn pipeline_with(providers: Vec<Box<dyn Provider>>) -> Pipeline {
    Pipeline::with_router(config(), gold_store(), ProviderRouter::new(providers))
}

const GOOD_SQL_RESPONSE: &str = "```sql\nSELECT SUM(cases) AS total FROM gold.fct_daily_uf \
WHERE uf = 'SP' AND day > date((SELECT MAX(day) FROM gold.fct_daily_uf), '-30 day')\n```";

#[tokio::test]
async fn quantitative_question_runs_the_full_path() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![Box::new(ScriptedProvider {
        id: "openai".into(),
        response: Ok(GOOD_SQL_RESPONSE.into()),
        calls: Arc::clone(&calls),
    })]);

    let outcome = pipeline
        .natural_language_query("quantos casos tivemos em SP nos últimos 30 dias", &[])
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::NlQuery);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    match outcome.answer {
        Answer::Table { result } => {
            assert!(result.executed_sql.ends_with("LIMIT 500"));
            let total = result.scalar().and_then(|v| v.as_i64()).unwrap();
            assert!(total > 0, "expected cases, got {total}");
        }
        other => panic!("expected a table, got {other:?}"),
    }
}

#[tokio::test]
async fn fallback_provider_answers_when_the_first_fails() {
    let calls_a = Arc::new(AtomicUsize::new(0));
    let calls_b = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![
        Box::new(ScriptedProvider {
            id: "openai".into(),
            response: Err(ProviderError::RateLimited("429".into())),
            calls: Arc::clone(&calls_a),
        }),
        Box::new(ScriptedProvider {
            id: "groq".into(),
            response: Ok(GOOD_SQL_RESPONSE.into()),
            calls: Arc::clone(&calls_b),
        }),
    ]);

    let outcome = pipeline
        .natural_language_query("qual o total de casos em SP?", &[])
        .await
        .unwrap();
    assert!(matches!(outcome.answer, Answer::Table { .. }));
    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(calls_b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn all_provider_timeouts_surface_as_exhaustion_not_partial_success() {
    let calls_a = Arc::new(AtomicUsize::new(0));
    let calls_b = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![
        Box::new(HangingProvider {
            id: "openai".into(),
            calls: Arc::clone(&calls_a),
        }),
        Box::new(HangingProvider {
            id: "groq".into(),
            calls: Arc::clone(&calls_b),
        }),
    ]);

    let err = pipeline
        .natural_language_query("quantos casos tivemos em SP?", &[])
        .await
        .unwrap_err();

    let failures = err.provider_failures().expect("typed exhaustion error");
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|(_, e)| matches!(e, ProviderError::Timeout)));
    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(calls_b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn news_question_never_touches_a_provider() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![Box::new(ScriptedProvider {
        id: "openai".into(),
        response: Ok(GOOD_SQL_RESPONSE.into()),
        calls: Arc::clone(&calls),
    })]);

    let outcome = pipeline
        .natural_language_query("quais as notícias mais recentes sobre SRAG?", &[])
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::News);
    assert!(matches!(outcome.answer, Answer::Text { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn greeting_answers_without_any_provider_configured() {
    let pipeline = pipeline_with(vec![]);
    let outcome = pipeline
        .natural_language_query("oi, tudo bem?", &[])
        .await
        .unwrap();
    assert_eq!(outcome.intent, Intent::Greet);
    match outcome.answer {
        Answer::Text { text } => assert!(text.contains("agente SRAG")),
        other => panic!("expected text, got {other:?}"),
    }
}

#[tokio::test]
async fn malicious_generation_is_rejected_before_execution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![Box::new(ScriptedProvider {
        id: "openai".into(),
        response: Ok("```sql\nSELECT 1; DROP TABLE gold.fct_daily_uf\n```".into()),
        calls: Arc::clone(&calls),
    })]);

    let err = pipeline
        .natural_language_query("quantos casos no total?", &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Rejected(RejectionReason::MultiStatement)
    ));

    // The table is untouched: a canned query over it still answers.
    let (_, kpis) = pipeline.kpis(None).unwrap();
    assert!(!kpis.is_empty());
}

#[tokio::test]
async fn non_whitelisted_table_in_generation_is_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![Box::new(ScriptedProvider {
        id: "openai".into(),
        response: Ok("SELECT * FROM bronze.raw_cases".into()),
        calls: Arc::clone(&calls),
    })]);

    let err = pipeline
        .natural_language_query("quantos registros na camada bronze?", &[])
        .await
        .unwrap_err();
    match err {
        AgentError::Rejected(RejectionReason::TableNotWhitelisted(table)) => {
            assert_eq!(table, "bronze.raw_cases");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn trend_question_is_answered_from_canned_series() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![Box::new(ScriptedProvider {
        id: "openai".into(),
        response: Ok(GOOD_SQL_RESPONSE.into()),
        calls: Arc::clone(&calls),
    })]);

    let outcome = pipeline
        .natural_language_query("tendência nos últimos 30 dias", &[])
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::Trend);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    match outcome.answer {
        Answer::Text { text } => {
            assert!(text.contains("Tendência"), "got: {text}");
            // SP cases grow daily, so the 7d delta is positive and available.
            assert!(text.contains('%'), "got: {text}");
        }
        other => panic!("expected text, got {other:?}"),
    }
}

#[tokio::test]
async fn comparison_ranks_states_without_a_provider() {
    let pipeline = pipeline_with(vec![]);
    let outcome = pipeline
        .natural_language_query("comparar ranking de casos por UF", &[])
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::Compare);
    match outcome.answer {
        Answer::Table { result } => {
            assert_eq!(result.columns[0], "uf");
            assert_eq!(result.rows[0][0], serde_json::json!("SP"));
        }
        other => panic!("expected a table, got {other:?}"),
    }
}

#[tokio::test]
async fn explain_question_is_answered_from_the_glossary() {
    let pipeline = pipeline_with(vec![]);
    let outcome = pipeline
        .natural_language_query("o que é CFR?", &[])
        .await
        .unwrap();
    assert_eq!(outcome.intent, Intent::Explain);
    match outcome.answer {
        Answer::Text { text } => assert!(text.contains("CFR"), "got: {text}"),
        other => panic!("expected text, got {other:?}"),
    }
}

#[tokio::test]
async fn unclassifiable_message_gets_help_text_not_generated_sql() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(vec![Box::new(ScriptedProvider {
        id: "openai".into(),
        response: Ok(GOOD_SQL_RESPONSE.into()),
        calls: Arc::clone(&calls),
    })]);

    let outcome = pipeline
        .natural_language_query("xyzzy plugh", &[])
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::Unknown);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    match outcome.answer {
        Answer::Text { text } => assert!(text.contains("Não entendi"), "got: {text}"),
        other => panic!("expected help text, got {other:?}"),
    }
}

#[tokio::test]
async fn classify_intent_uses_the_model_tier_when_enabled() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut cfg = config();
    cfg.use_model_intent = true;
    let pipeline = Pipeline::with_router(
        cfg,
        gold_store(),
        ProviderRouter::new(vec![Box::new(ScriptedProvider {
            id: "openai".into(),
            response: Ok("trend".into()),
            calls: Arc::clone(&calls),
        })]),
    );

    // Rule tier decides alone when it can.
    let c = pipeline.classify_intent("oi, tudo bem?").await.unwrap();
    assert_eq!(c.intent, Intent::Greet);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Unmatched text consults the model tier.
    let c = pipeline.classify_intent("xyzzy plugh").await.unwrap();
    assert_eq!(c.intent, Intent::Trend);
    assert!(!c.rule_based);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn validate_only_appends_and_clamps_limits() {
    let pipeline = pipeline_with(vec![]);

    let validated = pipeline
        .validate_only("SELECT uf, SUM(cases) FROM gold.fct_daily_uf GROUP BY uf")
        .unwrap();
    assert!(validated.sql().ends_with("LIMIT 500"));

    let clamped = pipeline
        .validate_only("SELECT * FROM gold.fct_daily_uf LIMIT 999999")
        .unwrap();
    assert!(clamped.sql().ends_with("LIMIT 5000"));

    let err = pipeline
        .validate_only("DELETE FROM gold.fct_daily_uf")
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Rejected(RejectionReason::NonSelect(_))
    ));

    // SQLite's two-literal form would make the second literal the effective
    // row count; it must never come back validated.
    let err = pipeline
        .validate_only("SELECT * FROM gold.fct_daily_uf LIMIT 1, 999999")
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Rejected(RejectionReason::LimitInjectionFailed(_))
    ));
}

#[tokio::test]
async fn kpis_cover_both_scopes() {
    let pipeline = pipeline_with(vec![]);

    let (growth_br, kpis_br) = pipeline.kpis(None).unwrap();
    assert_eq!(growth_br.columns[2], "growth_7d_pct");
    assert!(!kpis_br.is_empty());

    let (growth_sp, _) = pipeline.kpis(Some("SP")).unwrap();
    let cases_7d = growth_sp.scalar().and_then(|v| v.as_f64()).unwrap();
    assert!(cases_7d > 0.0);
}
