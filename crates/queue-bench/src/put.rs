//! Time-bounded put phase.

use std::sync::Arc;
use std::time::{Duration, Instant};

use queue_types::{BenchmarkResult, Phase, PutItem, QueueName};
use tracing::{debug, error, info};

use crate::client::QueueClient;
use crate::error::{BenchError, Result};
use crate::pool::{self, Step, Termination};

/// Hammers `/put` from `parallelism` workers for a fixed duration
#[derive(Debug, Clone)]
pub struct PutBenchmark {
    client: QueueClient,
    queue: Arc<QueueName>,
    payload: Arc<PutItem>,
    duration: Duration,
    parallelism: usize,
}

impl PutBenchmark {
    pub fn new(
        client: QueueClient,
        queue: QueueName,
        payload: PutItem,
        duration: Duration,
        parallelism: usize,
    ) -> Self {
        Self {
            client,
            queue: Arc::new(queue),
            payload: Arc::new(payload),
            duration,
            parallelism,
        }
    }

    /// Run the phase.
    ///
    /// The count is the server's `num-queued` delta across the phase and the
    /// rate divides it by the configured duration. Any failed put aborts the
    /// phase once every worker has stopped.
    pub async fn run(&self) -> Result<BenchmarkResult> {
        let start = Instant::now();
        let before = self.client.get_stats().await.map_err(BenchError::Stats)?;

        info!(
            queue = %self.queue,
            workers = self.parallelism,
            seconds = self.duration.as_secs_f64(),
            "starting put phase"
        );

        // In-flight puts finish before a unit exits, so every put the server
        // counts was also observed by a worker
        let mut workers = pool::spawn_with(self.parallelism, Termination::AfterCall, {
            let client = self.client.clone();
            let queue = self.queue.clone();
            let payload = self.payload.clone();
            move |_unit| {
                let client = client.clone();
                let queue = queue.clone();
                let payload = payload.clone();
                async move {
                    client
                        .enqueue(&queue, &payload)
                        .await
                        .map_err(BenchError::Put)?;
                    Ok(Step::Continue)
                }
            }
        });

        let failure = tokio::select! {
            _ = tokio::time::sleep(self.duration) => None,
            err = workers.first_failure() => Some(err),
        };

        if let Some(err) = failure {
            error!(error = %err, "put worker failed, stopping phase");
            if let Err(other) = workers.terminate_all().await {
                debug!(error = %other, "further put failure during shutdown");
            }
            return Err(err);
        }

        let summary = workers.terminate_all().await?;
        let after = self.client.get_stats().await.map_err(BenchError::Stats)?;
        let total = after.queued_since(&before, &self.queue);

        info!(
            total,
            completed_ops = summary.completed_ops,
            wall_secs = start.elapsed().as_secs_f64(),
            "put phase finished"
        );

        Ok(BenchmarkResult::new(
            Phase::Put,
            total,
            self.duration,
            summary.completed_ops,
        ))
    }
}
