//! `datachat`: index table metadata, search it, and ask questions over it.
//!
//! ```bash
//! datachat index --template semantics.json
//! datachat search "monthly revenue by region" -k 5
//! datachat ask "which customers opened the most tickets?"
//! ```

mod app;
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use datachat_retrieval::SemanticsDocument;
use datachat_workflow::StreamEventType;
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "datachat", version, about = "Ask questions about your database")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace the collection with the tables of a semantics template
    Index(IndexArgs),

    /// Hybrid search over indexed tables
    Search(SearchArgs),

    /// Answer a question, printing one JSON event per line
    Ask(AskArgs),
}

#[derive(Debug, Parser)]
struct IndexArgs {
    /// Semantics template (JSON with a top-level `schemas` key)
    #[arg(long, value_name = "FILE")]
    template: PathBuf,

    /// Collection to write instead of the configured one
    #[arg(long)]
    collection: Option<String>,
}

#[derive(Debug, Parser)]
struct SearchArgs {
    #[arg(value_name = "QUERY")]
    query: String,

    /// Number of results
    #[arg(short, default_value_t = 5)]
    k: usize,

    /// Skip reranking for this search
    #[arg(long)]
    no_rerank: bool,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[arg(value_name = "QUESTION")]
    question: String,

    /// Conversation to continue
    #[arg(long, default_value = "default")]
    conversation_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Index(args) => run_index(&config, args).await,
        Command::Search(args) => run_search(&config, args).await,
        Command::Ask(args) => run_ask(&config, args).await,
    }
}

async fn run_index(config: &AppConfig, args: IndexArgs) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.template)
        .await
        .with_context(|| format!("failed to read template {}", args.template.display()))?;
    let document = SemanticsDocument::from_json(&text)?;

    let engine = app::retrieval(config, args.collection.as_deref());
    let report = engine.index_tables(&document).await?;

    info!(
        "Indexed {} tables from {} schemas into {}",
        report.tables, report.schemas, report.collection
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_search(config: &AppConfig, args: SearchArgs) -> Result<()> {
    let engine = app::retrieval(config, None);
    let rerank = if args.no_rerank { Some(false) } else { None };
    let hits = engine.search(&args.query, args.k, rerank).await?;

    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

async fn run_ask(config: &AppConfig, args: AskArgs) -> Result<()> {
    let workflow = app::workflow(config, app::retrieval(config, None));
    let mut events = std::pin::pin!(workflow.run_stream(args.question, args.conversation_id));

    let mut failed = None;
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.event_type == StreamEventType::Error {
            failed = event.data["error"].as_str().map(str::to_string);
        }
    }

    if let Some(message) = failed {
        bail!("workflow failed: {message}");
    }
    Ok(())
}
