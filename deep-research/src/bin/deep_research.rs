/*
  deep-research: query → brief → topics → parallel research → compress → report

  Each stage output passes a structural gate and is committed under
  <checkpoint-dir>/<run-id>/ (brief.md, topics.yaml, findings/<i>.yaml,
  compressed.yaml, report.md). With --resume a rerun continues from the last
  committed stage; a finished run returns its report without new calls.

  Environment (.env is loaded):
    OPENAI_API_KEY       required
    OPENAI_BASE_URL      default https://api.openai.com/v1
    DEEP_RESEARCH_MODEL  default gpt-4o
    SEARX_URL            required, SearxNG instance with JSON output enabled
    RUST_LOG             default deep_research=info

  EXAMPLE COMMANDS:

    deep-research "Compare React vs Vue vs Svelte for web development"
    deep-research -o report.md -p 5 --max-searches 3 "History of artificial intelligence"
    deep-research --resume --checkpoint-dir ./runs "How do arena allocators work?"
    deep-research -i
*/

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use deep_research::providers::{OpenAiGenerator, ProviderConfig, SearxSearch};
use deep_research::research::{cli::Args, Pipeline, PipelineOptions};
use deep_research_sdk::{log_file_saved, log_info, log_warning};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deep_research=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn banner(title: &str) {
    eprintln!("\n{}", "=".repeat(60));
    eprintln!("  {}", title);
    eprintln!("{}", "=".repeat(60));
}

async fn run_query(pipeline: &Pipeline, query: &str, output: Option<&Path>) -> Result<()> {
    banner("Deep Research");
    log_info!("Query: {}", query);
    log_info!("Run id: {}", pipeline.run_id_for(query));

    let report = pipeline.execute(query).await?;

    banner("REPORT");
    let mut stdout = tokio::io::stdout();
    stdout.write_all(report.markdown().as_bytes()).await?;
    stdout.flush().await?;

    if let Some(path) = output {
        tokio::fs::write(path, report.markdown())
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        log_file_saved!(path.display());
    }
    Ok(())
}

async fn interactive(pipeline: &Pipeline, model: &str) -> Result<()> {
    banner("Deep Research - Interactive Mode");
    log_info!("Model: {}", model);
    log_info!("Max parallel researchers: {}", pipeline.options().max_concurrency);
    eprintln!("\nEnter your research query (or 'quit' to exit):\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if matches!(query.to_lowercase().as_str(), "quit" | "q" | "exit") {
            break;
        }
        if query.is_empty() {
            eprintln!("Please enter a query.\n");
            continue;
        }
        // One failed query does not end the session
        if let Err(e) = run_query(pipeline, query, None).await {
            log_warning!("{:#}", e);
        }
        eprintln!();
    }
    eprintln!("\nGoodbye!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = ProviderConfig::from_env()?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }

    let generator = Arc::new(OpenAiGenerator::new(&config)?);
    let search = Arc::new(SearxSearch::new(&config)?);

    let interactive_mode = args.is_interactive();
    let query = args.query.clone();
    let output = args.output.clone();
    let options: PipelineOptions = args.into();
    if let Some(dir) = &options.checkpoint_location {
        log_info!("Checkpoints: {}", dir.display());
    }

    let pipeline = Pipeline::new(options, generator, search);

    match query {
        Some(query) if !interactive_mode => run_query(&pipeline, &query, output.as_deref()).await,
        _ => interactive(&pipeline, &config.model).await,
    }
}
