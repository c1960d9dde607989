//! Imole chat gateway
//!
//! The HTTP entry point for the legal-assistance chatbot:
//! - `POST /chat` runs augment -> retrieve -> respond
//! - Health and readiness probes
//! - Observability (logging, metrics, request tracing)
//!
//! `gateway ask "<question>"` runs the same pipeline once from the shell.

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use imole_common::{
    config::AppConfig,
    db::{CaseStore, DbPool, Repository},
    embeddings::create_embedder,
    metrics, RagPipeline, VERSION,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CaseStore>,
    pub pipeline: Arc<RagPipeline>,
}

#[derive(Parser)]
#[command(name = "gateway", version = VERSION)]
#[command(about = "Legal-assistance chat gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Answer one question and print the response
    Ask { question: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    let serving = !matches!(cli.command, Some(Command::Ask { .. }));
    init_tracing(&config, serving);

    let state = build_state(config.clone()).await?;

    match cli.command {
        Some(Command::Ask { question }) => {
            let answer = state.pipeline.answer(&question).await?;
            if let Some(case) = &answer.case {
                info!(filename = %case.filename, similarity = case.similarity, "Grounding case");
            }
            println!("{}", answer.response);
            Ok(())
        }
        Some(Command::Serve) | None => serve(state).await,
    }
}

fn init_tracing(config: &AppConfig, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json && config.observability.json_logging {
        builder.json().init();
    } else {
        builder.with_writer(std::io::stderr).compact().init();
    }
}

/// Connect the store and wire the pipeline
async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let store: Arc<dyn CaseStore> = Arc::new(Repository::new(db, config.embedding.dimension));
    let embedder = create_embedder(&config)?;
    let pipeline = RagPipeline::from_config(&config, embedder, store.clone())?;

    Ok(AppState {
        config,
        store,
        pipeline: Arc::new(pipeline),
    })
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let config = state.config.clone();
    info!("Starting Imole gateway v{}", VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                metrics::UPSTREAM_BUCKETS,
            )?
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }
    metrics::register_metrics();

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host/server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (signalled_tx, signalled_rx) = oneshot::channel();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    });

    drain_with_timeout(server.into_future(), signalled_rx, config.shutdown_timeout()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Run `server` to completion, giving it `timeout` to drain once `signalled` fires
async fn drain_with_timeout<F>(
    server: F,
    signalled: oneshot::Receiver<()>,
    timeout: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        Ok(()) = signalled => {}
    }

    match tokio::time::timeout(timeout, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Shutdown timed out, dropping open connections");
            Ok(())
        }
    }
}

/// Create the main application router
fn create_router(state: AppState, config: &AppConfig) -> Router {
    // CORS configuration
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let cors = match config.server.cors_origin.as_str() {
        "*" => cors.allow_origin(Any),
        origin => match HeaderValue::from_str(origin) {
            Ok(origin) => cors.allow_origin(origin),
            Err(_) => {
                warn!(origin, "Invalid CORS origin, allowing any");
                cors.allow_origin(Any)
            }
        },
    };

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    Router::new()
        // The web front-end posts to `/chat/`
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/", post(handlers::chat::chat))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route_layer(axum::middleware::from_fn(middleware::track_requests))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
