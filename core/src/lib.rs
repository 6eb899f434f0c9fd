//! tsbench-core: Worker pool and metrics aggregation for query benchmarking
//!
//! This crate provides the machinery behind the `tsbench` CLI:
//!
//! - An affinity-routed worker pool: all queries sharing a hostname execute
//!   on the same worker, in submission order
//! - Bounded-memory latency aggregation with two interchangeable
//!   strategies (exact and reservoir-sampled)
//! - A retry-aware TimescaleDB client
//! - CSV work-source decoding with per-row error recovery
//! - Run orchestration with cooperative cancellation and an ordered
//!   shutdown protocol

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod pool;
pub mod query;

pub use client::{ClientError, QueryClient, QueryResponse, TimescaleClient, TimescaleConfig};
pub use config::{BenchConfig, ConfigError};
pub use error::{Error, Result};
pub use metrics::{
    Aggregator, ExactAggregator, MetricsError, ReservoirAggregator, Summary,
    EXACT_DEFAULT_CAPACITY, RESERVOIR_DEFAULT_SAMPLE_SIZE,
};
pub use orchestrator::{Orchestrator, RunReport};
pub use pool::{AffinityRouter, Outcome, ResultCollector, WorkerPool, WorkerReport, MAX_WORKERS};
pub use query::{CsvQuerySource, Query, QuerySource, SourceError};
