//! Drain-to-exhaustion take phase.

use std::sync::Arc;
use std::time::{Duration, Instant};

use queue_types::{BenchmarkResult, Phase, QueueName};
use tracing::{info, warn};

use crate::client::{Dequeue, QueueClient};
use crate::error::{BenchError, Result};
use crate::pool::{self, Step};

/// Takes from the queue with `parallelism` workers until every worker sees it empty
#[derive(Debug, Clone)]
pub struct TakeBenchmark {
    client: QueueClient,
    queue: Arc<QueueName>,
    poll_timeout: Duration,
    parallelism: usize,
}

impl TakeBenchmark {
    pub fn new(
        client: QueueClient,
        queue: QueueName,
        poll_timeout: Duration,
        parallelism: usize,
    ) -> Self {
        Self {
            client,
            queue: Arc::new(queue),
            poll_timeout,
            parallelism,
        }
    }

    /// Run the phase.
    ///
    /// The rate numerator is the queue's final `num-queued`, i.e. everything
    /// ever put on it, not the number of takes the workers observed. That only
    /// estimates take throughput because the queue is fresh and the phase runs
    /// until it is empty.
    pub async fn run(&self) -> Result<BenchmarkResult> {
        info!(
            queue = %self.queue,
            workers = self.parallelism,
            "starting take phase"
        );
        let start = Instant::now();

        let workers = pool::spawn(self.parallelism, {
            let client = self.client.clone();
            let queue = self.queue.clone();
            let poll_timeout = self.poll_timeout;
            move |unit| {
                let client = client.clone();
                let queue = queue.clone();
                async move {
                    match client.dequeue(&queue, poll_timeout).await {
                        Ok(Dequeue::Item) => Ok(Step::Continue),
                        Ok(Dequeue::Empty) => Ok(Step::Stop),
                        Err(err) => {
                            warn!(unit, error = %err, "take failed, stopping worker");
                            Ok(Step::Stop)
                        }
                    }
                }
            }
        });

        let summary = workers.join_all().await?;
        let elapsed = start.elapsed();

        let stats = self.client.get_stats().await.map_err(BenchError::Stats)?;
        let count = stats.num_queued(&self.queue);

        info!(
            count,
            completed_ops = summary.completed_ops,
            elapsed_secs = elapsed.as_secs_f64(),
            "take phase finished"
        );

        Ok(BenchmarkResult::new(
            Phase::Take,
            count,
            elapsed,
            summary.completed_ops,
        ))
    }
}
