use anyhow::{Context, Result};
use clap::Parser;
use mock_queue::{router, MockQueueConfig, QueueStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// In-memory queue server for running queue-bench locally
#[derive(Debug, Parser)]
#[command(name = "mock-queue", version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Answer every /put with 500
    #[arg(long)]
    fail_puts: bool,

    /// Answer every /take with 500
    #[arg(long)]
    fail_takes: bool,

    /// Answer every /stats with 500
    #[arg(long)]
    fail_stats: bool,

    /// Answer every /stats with 200 and a body that is not JSON
    #[arg(long)]
    malformed_stats: bool,

    /// Log filter, e.g. "info" or "mock_queue=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_new(&args.log_level).context("Invalid --log-level")?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = MockQueueConfig {
        fail_puts: args.fail_puts,
        fail_takes: args.fail_takes,
        fail_stats: args.fail_stats,
        malformed_stats: args.malformed_stats,
    };
    info!(
        "Fault injection: fail_puts={}, fail_takes={}, fail_stats={}, malformed_stats={}",
        config.fail_puts, config.fail_takes, config.fail_stats, config.malformed_stats
    );

    let app = router(Arc::new(QueueStore::new()), config);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Starting mock queue on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {:#}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received, stopping mock queue");
        })
        .await?;

    Ok(())
}
