//! Throughput benchmark for an HTTP queue server.
//!
//! A run puts items on a fresh queue from a pool of workers for a fixed
//! duration, then drains the queue with a second pool, and reports puts and
//! takes per second derived from the server's `/stats` counters.

pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod put;
pub mod runner;
pub mod take;

pub use client::{Dequeue, QueueClient};
pub use config::{Args, BenchConfig, OutputFormat};
pub use error::{BenchError, ClientError};
pub use put::PutBenchmark;
pub use runner::{render_report, BenchmarkRunner};
pub use take::TakeBenchmark;
