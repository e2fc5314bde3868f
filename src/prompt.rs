//! Prompt scaffolding for the SQL generation and classification calls.
//!
//! The agent never sees row data: prompts carry table/column names and short
//! descriptions only, plus the user message.

use crate::schema::SchemaSnapshot;

/// System prompt for SQL generation. The model must emit exactly one SELECT;
/// everything else is the guard's problem, not the prompt's.
pub const SQL_SYSTEM_PROMPT: &str = r#"You translate Portuguese or English analytics questions into SQL for an SQLite-compatible analytical store.

Rules:
- Emit EXACTLY ONE statement, and it must be a SELECT (WITH ... SELECT is fine).
- Reference only the tables and columns listed in the schema below.
- Never write DDL or DML of any kind.
- Prefer aggregations anchored on the most recent available date, e.g.
  `(SELECT MAX(day) FROM gold.fct_daily_uf)`.
- Use `date(<anchor>, '-30 day')` style date arithmetic.
- Return the SQL alone. No prose, no explanation."#;

/// Stricter re-prompt used once after an extraction failure.
pub const SQL_RETRY_SYSTEM_PROMPT: &str = r#"Your previous answer did not contain a usable SQL statement.

Respond with ONE SQLite SELECT statement and NOTHING else: no markdown fences, no commentary, no trailing semicolon. Use only the tables and columns from the schema provided."#;

/// Constrained prompt for the model-assisted intent tier. The answer must be
/// one token from the closed set; anything else resolves to unknown.
pub const INTENT_SYSTEM_PROMPT: &str = r#"Classify the user's message into exactly one of these intents:

greet news report explain dataqa nlquery trend compare chitchat unknown

- nlquery: a quantitative question answerable with SQL over case data
- dataqa: a question about what the data/columns mean
- explain: asks for the definition of a term or metric
- trend: asks how a series evolved over time
- compare: asks for a ranking or comparison between states

Answer with the single intent word in lowercase. Nothing else."#;

/// User prompt for SQL generation: schema first, then the question.
pub fn build_sql_user_prompt(snapshot: &SchemaSnapshot, message: &str, history: &[String]) -> String {
    let mut prompt = String::from("Schema of the analytical store:\n\n");
    prompt.push_str(&snapshot.render_for_prompt());
    if !history.is_empty() {
        prompt.push_str("\nEarlier messages in this conversation:\n");
        for line in history.iter().rev().take(4).rev() {
            prompt.push_str(&format!("- {}\n", line));
        }
    }
    prompt.push_str(&format!("\nQuestion: {}\n\nSQL:", message));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, SchemaSnapshot, TableDescriptor};

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            namespace: "gold".into(),
            tables: vec![TableDescriptor {
                schema: "gold".into(),
                name: "fct_daily_uf".into(),
                columns: vec![ColumnDescriptor {
                    name: "cases".into(),
                    ty: "INTEGER".into(),
                    description: None,
                }],
                allowed: true,
            }],
        }
    }

    #[test]
    fn user_prompt_embeds_schema_and_question() {
        let prompt = build_sql_user_prompt(&snapshot(), "quantos casos?", &[]);
        assert!(prompt.contains("gold.fct_daily_uf"));
        assert!(prompt.contains("quantos casos?"));
    }

    #[test]
    fn history_is_capped_at_four_lines() {
        let history: Vec<String> = (0..10).map(|i| format!("msg {}", i)).collect();
        let prompt = build_sql_user_prompt(&snapshot(), "q", &history);
        assert!(!prompt.contains("msg 5"));
        assert!(prompt.contains("msg 9"));
    }
}
