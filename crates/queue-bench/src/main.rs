use anyhow::{Context, Result};
use clap::Parser;
use queue_bench::{render_report, Args, BenchConfig, BenchmarkRunner};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries only the report
    let env_filter = EnvFilter::try_new(&args.log_level).context("Invalid --log-level")?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = BenchConfig::try_from(args).context("Invalid benchmark configuration")?;

    info!("Benchmarking queue server at {}", config.url);
    info!(
        "Put phase: {}s, {} workers; take poll timeout: {}ms",
        config.put_duration.as_secs(),
        config.parallelism,
        config.take_timeout.as_millis()
    );

    let report = BenchmarkRunner::new(config.clone())
        .run()
        .await
        .context("Benchmark failed")?;

    let rendered = render_report(&report, config.format).context("Failed to render report")?;
    println!("{}", rendered);

    Ok(())
}
