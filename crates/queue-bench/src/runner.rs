//! Runs the put phase then the take phase against one fresh queue.

use queue_types::{BenchmarkReport, QueueName};
use tracing::info;

use crate::client::QueueClient;
use crate::config::{BenchConfig, OutputFormat};
use crate::error::Result;
use crate::put::PutBenchmark;
use crate::take::TakeBenchmark;

#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    client: QueueClient,
    config: BenchConfig,
}

impl BenchmarkRunner {
    pub fn new(config: BenchConfig) -> Self {
        let client = QueueClient::new(config.url.clone());
        Self { client, config }
    }

    /// Run both phases against a newly generated queue
    pub async fn run(&self) -> Result<BenchmarkReport> {
        self.run_on(QueueName::generate()).await
    }

    /// Run both phases against `queue`.
    ///
    /// The take phase starts only after every put worker has stopped.
    pub async fn run_on(&self, queue: QueueName) -> Result<BenchmarkReport> {
        info!(queue = %queue, url = self.client.base_url(), "benchmark run starting");

        let put = PutBenchmark::new(
            self.client.clone(),
            queue.clone(),
            self.config.payload.clone(),
            self.config.put_duration,
            self.config.parallelism,
        )
        .run()
        .await?;

        let take = TakeBenchmark::new(
            self.client.clone(),
            queue.clone(),
            self.config.take_timeout,
            self.config.parallelism,
        )
        .run()
        .await?;

        Ok(BenchmarkReport { queue, put, take })
    }
}

/// Render a report in the requested format
pub fn render_report(
    report: &BenchmarkReport,
    format: OutputFormat,
) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(report.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(report),
    }
}
