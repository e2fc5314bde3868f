use anyhow::Result;
use clap::Parser;
use srag_agent::config::AgentConfig;
use srag_agent::pipeline::Pipeline;
use srag_agent::storage::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "srag-agent")]
#[command(about = "Guarded natural-language query agent for the SRAG data mart")]
struct Args {
    /// The question in natural language (PT-BR or English)
    question: String,

    /// Path to the SQLite database holding the gold mart
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Validate the input as SQL and print the guarded statement, without executing
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = AgentConfig::from_env()?;
    if let Some(db) = args.db {
        config.storage_location = db;
    }

    let store = Arc::new(SqliteStore::open(
        &config.storage_location,
        &config.allowed_namespace,
    )?);
    let pipeline = Pipeline::new(config, store);

    if args.validate_only {
        let validated = pipeline.validate_only(&args.question)?;
        println!("{}", validated.sql());
        return Ok(());
    }

    info!(question = %args.question, "answering");
    let outcome = pipeline.natural_language_query(&args.question, &[]).await?;
    println!("{}", outcome.answer.to_markdown());
    Ok(())
}
