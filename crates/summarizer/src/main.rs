//! Imole summarizer CLI
//!
//! - `run`: summarize new documents into `summariesup.json`
//! - `upload`: embed stored summaries into `legal_cases`

use anyhow::Context;
use clap::{Parser, Subcommand};
use imole_common::{
    config::AppConfig, db::DbPool, embeddings::create_embedder, llm::create_chat_model,
    Repository, VERSION,
};
use imole_summarizer::{BatchJob, Summarizer, SummaryStore, Uploader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "summarizer", version = VERSION)]
#[command(about = "Summarize legal case documents and load them for retrieval")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize documents not yet in the store
    Run {
        /// Folder of UTF-8 case documents
        #[arg(long)]
        documents: PathBuf,

        #[arg(long, default_value = "summariesup.json")]
        store: PathBuf,

        #[arg(long, default_value = "error_log.txt")]
        error_log: PathBuf,

        /// Characters per chunk for long documents
        #[arg(long, default_value_t = imole_summarizer::summarize::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Embed stored summaries into the legal_cases table
    Upload {
        #[arg(long, default_value = "summariesup.json")]
        store: PathBuf,

        /// Apply bundled migrations first
        #[arg(long)]
        migrate: bool,
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
    info!("Imole summarizer v{}", VERSION);

    match cli.command {
        Command::Run {
            documents,
            store,
            error_log,
            chunk_size,
        } => {
            let role = &config.models.summarize;
            let summarizer = Summarizer::new(create_chat_model(&config, role)?, role.max_tokens)
                .with_chunk_size(chunk_size);

            let report = BatchJob::new(summarizer)
                .execute(&documents, &store, &error_log)
                .await?;

            if report.failed > 0 {
                warn!(
                    failed = report.failed,
                    error_log = %error_log.display(),
                    "Some files failed to process"
                );
            }
            info!(store = %store.display(), "Updated summaries saved");
        }
        Command::Upload { store, migrate } => {
            let summaries = SummaryStore::open(&store)?;

            let pool = DbPool::new(&config.database).await?;
            if migrate || config.database.run_migrations {
                pool.migrate().await?;
            }

            let cases = Arc::new(Repository::new(pool, config.embedding.dimension));
            let uploader = Uploader::new(create_embedder(&config)?, cases);
            let report = uploader.upload(&summaries).await?;

            info!(
                inserted = report.inserted,
                skipped = report.skipped,
                failed = report.failed,
                "Upload complete"
            );
        }
    }

    Ok(())
}
