//! Concurrent batch-write benchmark: names, write policies, jobs, the
//! worker pool and the run orchestrator.

pub mod config;
pub mod host;
pub mod indexing;
pub mod job;
pub mod metrics;
pub mod name_gen;
pub mod pool;
pub mod run;

pub use config::{BenchmarkConfig, RemainderPolicy, Sweep, DEFAULT_TOTAL_NODES};
pub use host::HostResources;
pub use indexing::{Indexing, NodeFactory, NodePayload, DEFAULT_INDEX_NAME, LIKES, NAME_KEY};
pub use job::{BatchJob, JobOutcome};
pub use metrics::{JobMetrics, JobMetricsSnapshot};
pub use name_gen::NameGenerator;
pub use pool::WorkerPool;
pub use run::{throughput, BenchmarkResult, BenchmarkRun, RunState};
