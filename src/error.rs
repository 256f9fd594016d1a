//! Error types for the write-throughput harness and its embedded store

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::NodeId;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Store unavailable at {path}: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("Transaction failed in batch job {job}: {source}")]
    TransactionFailure {
        job: usize,
        #[source]
        source: Box<BenchError>,
    },

    #[error("Name generator exhausted: {0}")]
    GeneratorExhaustion(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Transaction already closed")]
    TransactionClosed,

    #[error("Timed out waiting for unique key {index}:{key}={value}")]
    LockTimeout {
        index: String,
        key: String,
        value: String,
    },

    #[error("Deadlock waiting for unique key {index}:{key}={value}")]
    Deadlock {
        index: String,
        key: String,
        value: String,
    },

    #[error("Invalid benchmark config: {0}")]
    InvalidConfig(String),

    #[error("Benchmark run already executed")]
    AlreadyExecuted,

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Worker pool is shut down")]
    PoolShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),
}

impl BenchError {
    /// Stable error code for logs and JSON output
    pub fn code(&self) -> &'static str {
        match self {
            BenchError::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            BenchError::TransactionFailure { .. } => "TRANSACTION_FAILURE",
            BenchError::GeneratorExhaustion(_) => "GENERATOR_EXHAUSTION",
            BenchError::NodeNotFound(_) => "NODE_NOT_FOUND",
            BenchError::TransactionClosed => "TRANSACTION_CLOSED",
            BenchError::LockTimeout { .. } => "LOCK_TIMEOUT",
            BenchError::Deadlock { .. } => "DEADLOCK",
            BenchError::InvalidConfig(_) => "INVALID_CONFIG",
            BenchError::AlreadyExecuted => "ALREADY_EXECUTED",
            BenchError::WorkerPanicked(_) => "WORKER_PANICKED",
            BenchError::PoolShutDown => "POOL_SHUT_DOWN",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Wrap a failure raised inside a batch job's transaction.
    ///
    /// Already-wrapped failures are passed through so the job id of the
    /// innermost batch is kept.
    pub fn in_job(self, job: usize) -> Self {
        match self {
            err @ BenchError::TransactionFailure { .. } => err,
            other => BenchError::TransactionFailure {
                job,
                source: Box::new(other),
            },
        }
    }
}
