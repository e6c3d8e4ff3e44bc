use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Name of the queue a benchmark run writes to and drains.
///
/// Every run gets a fresh name so counters on the server are attributable to
/// that run alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueName(String);

impl QueueName {
    /// Wrap an existing queue name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a fresh `benchmark_<uuid>` name.
    ///
    /// The server does not accept `-` in queue names, so the hyphens of the
    /// UUID are replaced with underscores.
    pub fn generate() -> Self {
        let token = uuid::Uuid::new_v4().to_string().replace('-', "_");
        Self(format!("benchmark_{}", token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of a `/put` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutItem {
    pub item: String,
    pub data: String,
}

impl PutItem {
    /// Filler repeated to build the data blob
    pub const DATA_CHUNK: &'static str = "asdfasdf";

    /// Build a payload whose data is [`Self::DATA_CHUNK`] repeated `data_repeat` times
    pub fn new(item: impl Into<String>, data_repeat: usize) -> Self {
        Self {
            item: item.into(),
            data: Self::DATA_CHUNK.repeat(data_repeat),
        }
    }
}

impl Default for PutItem {
    fn default() -> Self {
        Self::new("foo", 10)
    }
}

/// Counters the server reports for a single queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items ever enqueued on this queue
    #[serde(rename = "num-queued")]
    pub num_queued: u64,
    /// Items currently waiting to be taken, if the server reports it
    #[serde(
        rename = "num-pending",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub num_pending: Option<u64>,
}

/// Point-in-time read of the `/stats` endpoint, keyed by queue name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsSnapshot(HashMap<String, QueueStats>);

impl StatsSnapshot {
    pub fn new(queues: HashMap<String, QueueStats>) -> Self {
        Self(queues)
    }

    pub fn get(&self, queue: &QueueName) -> Option<&QueueStats> {
        self.0.get(queue.as_str())
    }

    /// `num-queued` for the queue, or 0 if the server does not know it yet
    pub fn num_queued(&self, queue: &QueueName) -> u64 {
        self.get(queue).map(|stats| stats.num_queued).unwrap_or(0)
    }

    /// Items enqueued on `queue` between `earlier` and this snapshot.
    ///
    /// Saturates at zero if the server's counter went backwards.
    pub fn queued_since(&self, earlier: &StatsSnapshot, queue: &QueueName) -> u64 {
        self.num_queued(queue).saturating_sub(earlier.num_queued(queue))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One of the two benchmark stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Put,
    Take,
}

impl Phase {
    /// Plural operation name used in rate lines
    pub fn ops_label(&self) -> &'static str {
        match self {
            Phase::Put => "puts",
            Phase::Take => "takes",
        }
    }
}

/// Operations per second, truncated towards zero.
///
/// A zero duration yields a rate of 0 rather than an unbounded value.
pub fn rate_per_second(count: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (count as f64 / secs) as u64
}

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub phase: Phase,
    /// Server-side count the rate is derived from
    pub count: u64,
    #[serde(rename = "elapsed_secs", with = "duration_secs")]
    pub elapsed: Duration,
    pub rate: u64,
    /// Operations the workers saw succeed; informational only
    pub completed_ops: u64,
}

impl BenchmarkResult {
    pub fn new(phase: Phase, count: u64, elapsed: Duration, completed_ops: u64) -> Self {
        Self {
            phase,
            count,
            elapsed,
            rate: rate_per_second(count, elapsed),
            completed_ops,
        }
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.phase == Phase::Put {
            writeln!(f, "put {} items", self.count)?;
        }
        write!(f, "{} {}/second", self.rate, self.phase.ops_label())
    }
}

/// Combined result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub queue: QueueName,
    pub put: BenchmarkResult,
    pub take: BenchmarkResult,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.put)?;
        write!(f, "{}", self.take)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
