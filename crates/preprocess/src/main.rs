//! Imole preprocessing CLI
//!
//! - `extract`: corpus text -> `queries.json`
//! - `simplify`: `queries.json` -> `user_friendly_queries.json`

use anyhow::Context;
use clap::{Parser, Subcommand};
use imole_common::{config::AppConfig, files, llm::create_chat_model, VERSION};
use imole_preprocess::{extract_queries, read_corpus, QuerySet, QuerySimplifier};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "preprocess", version = VERSION)]
#[command(about = "Extract and simplify legal-case queries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract `AILA_Q<n>||` entries from a corpus file
    Extract {
        #[arg(long)]
        corpus: PathBuf,

        #[arg(long, default_value = "queries.json")]
        output: PathBuf,
    },
    /// Rewrite extracted cases into plain-language questions
    Simplify {
        #[arg(long, default_value = "queries.json")]
        input: PathBuf,

        #[arg(long, default_value = "user_friendly_queries.json")]
        output: PathBuf,
    },
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config);

    match cli.command {
        Command::Extract { corpus, output } => {
            let text = read_corpus(&corpus)?;
            let queries = extract_queries(&text);
            files::write_json(&output, &queries)?;
            info!(count = queries.len(), output = %output.display(), "Queries saved");
        }
        Command::Simplify { input, output } => {
            let queries: QuerySet = files::read_json(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let role = &config.models.simplify;
            let model = create_chat_model(&config, role)?;
            let max_tokens = role
                .max_tokens
                .unwrap_or(imole_preprocess::simplifier::DEFAULT_MAX_TOKENS);

            let simplified = QuerySimplifier::new(model, max_tokens)
                .simplify_all(&queries)
                .await?;
            files::write_json(&output, &simplified)?;
            info!(count = simplified.len(), output = %output.display(), "Simplified queries saved");
        }
    }

    Ok(())
}
