//! write-throughput: sustained write throughput of a transactional graph
//! store under varying batch sizes, indexing policies and thread counts.
//!
//! The store itself (`graph::GraphEngine`) is embedded: an in-memory graph
//! with per-transaction write buffers, unique-index get-or-create and an
//! append-only commit log.

pub mod bench;
pub mod error;
pub mod graph;
pub mod storage;

pub use bench::{
    BenchmarkConfig, BenchmarkResult, BenchmarkRun, Indexing, NodePayload, RemainderPolicy, RunState,
    Sweep,
};
pub use error::{BenchError, Result};
pub use graph::{GraphEngine, GraphStore, NodeId, StoreOptions, Transaction, TxHandle};
pub use storage::DurabilityMode;
