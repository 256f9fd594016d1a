//! Run parameters and sweeps of runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::graph::engine::DEFAULT_LOCK_WAIT_TIMEOUT;
use crate::graph::StoreOptions;
use crate::storage::DurabilityMode;
use super::indexing::{Indexing, NodePayload, DEFAULT_INDEX_NAME};

pub const DEFAULT_TOTAL_NODES: usize = 1000;

/// Batch sizes of the classic sweep, one output group each.
pub const CLASSIC_BATCH_SIZES: [usize; 2] = [1, 10];

pub const CLASSIC_THREAD_COUNTS: [usize; 5] = [1, 4, 16, 32, 100];

/// What happens to `total_nodes % batch_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Write only `total_nodes / batch_size` full batches.
    #[default]
    Drop,
    /// Add one undersized batch so exactly `total_nodes` are written.
    FinalBatch,
}

impl RemainderPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemainderPolicy::Drop => "drop",
            RemainderPolicy::FinalBatch => "final_batch",
        }
    }
}

impl FromStr for RemainderPolicy {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drop" => Ok(RemainderPolicy::Drop),
            "final_batch" | "exact" => Ok(RemainderPolicy::FinalBatch),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown remainder policy '{}' (expected drop|final-batch)",
                other
            ))),
        }
    }
}

/// Parameters of exactly one `BenchmarkRun`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    pub batch_size: usize,
    pub indexing: Indexing,
    pub worker_count: usize,
    pub total_nodes: usize,
    pub payload: NodePayload,
    pub remainder: RemainderPolicy,
    pub index_name: String,
    pub durability: DurabilityMode,
    /// Keep the store directory after the run instead of deleting it.
    pub keep_store: bool,
    /// Directory the run's store directory is created in (system temp dir
    /// when unset).
    pub store_root: Option<PathBuf>,
    pub lock_wait_timeout_ms: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            indexing: Indexing::Unique,
            worker_count: 1,
            total_nodes: DEFAULT_TOTAL_NODES,
            payload: NodePayload::default(),
            remainder: RemainderPolicy::default(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            durability: DurabilityMode::default(),
            keep_store: false,
            store_root: None,
            lock_wait_timeout_ms: DEFAULT_LOCK_WAIT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl BenchmarkConfig {
    pub fn new(batch_size: usize, indexing: Indexing, worker_count: usize) -> Self {
        Self {
            batch_size,
            indexing,
            worker_count,
            ..Self::default()
        }
    }

    pub fn total_nodes(mut self, total_nodes: usize) -> Self {
        self.total_nodes = total_nodes;
        self
    }

    pub fn payload(mut self, payload: NodePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn remainder(mut self, remainder: RemainderPolicy) -> Self {
        self.remainder = remainder;
        self
    }

    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }

    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    pub fn keep_store(mut self, keep_store: bool) -> Self {
        self.keep_store = keep_store;
        self
    }

    pub fn store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store_root = Some(root.into());
        self
    }

    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BenchError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.worker_count == 0 {
            return Err(BenchError::InvalidConfig("worker_count must be positive".into()));
        }
        if self.total_nodes == 0 {
            return Err(BenchError::InvalidConfig("total_nodes must be positive".into()));
        }
        if self.index_name.trim().is_empty() {
            return Err(BenchError::InvalidConfig("index_name must not be empty".into()));
        }
        Ok(())
    }

    /// Batch size of every job, in submission order.
    pub fn partition(&self) -> Vec<usize> {
        if self.batch_size == 0 {
            return Vec::new();
        }
        let full = self.total_nodes / self.batch_size;
        let rest = self.total_nodes % self.batch_size;

        let mut jobs = vec![self.batch_size; full];
        if self.remainder == RemainderPolicy::FinalBatch && rest > 0 {
            jobs.push(rest);
        }
        jobs
    }

    /// Nodes a successful run writes.
    pub fn nodes_to_write(&self) -> usize {
        self.partition().iter().sum()
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .durability(self.durability)
            .lock_wait_timeout(Duration::from_millis(self.lock_wait_timeout_ms))
    }
}

/// Ordered runs, split into groups printed with a separator between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    groups: Vec<Vec<BenchmarkConfig>>,
}

/// Accepted layouts of a sweep file.
#[derive(Deserialize)]
#[serde(untagged)]
enum SweepFile {
    Grouped(Vec<Vec<BenchmarkConfig>>),
    Flat(Vec<BenchmarkConfig>),
}

impl Sweep {
    pub fn new(groups: Vec<Vec<BenchmarkConfig>>) -> Self {
        let groups = groups.into_iter().filter(|g| !g.is_empty()).collect();
        Self { groups }
    }

    /// The classic sweep: batch sizes 1 and 10, each against 1, 4, 16,
    /// 32 and 100 threads, unique indexing, 1000 nodes.
    pub fn classic() -> Self {
        Self::cartesian(
            &CLASSIC_BATCH_SIZES,
            &[Indexing::Unique],
            &CLASSIC_THREAD_COUNTS,
            &BenchmarkConfig::default(),
        )
    }

    /// Every combination, grouped by batch size. Non-swept fields come
    /// from `template`.
    pub fn cartesian(
        batch_sizes: &[usize],
        indexings: &[Indexing],
        thread_counts: &[usize],
        template: &BenchmarkConfig,
    ) -> Self {
        let groups = batch_sizes
            .iter()
            .map(|&batch_size| {
                indexings
                    .iter()
                    .flat_map(|&indexing| {
                        thread_counts.iter().map(move |&worker_count| BenchmarkConfig {
                            batch_size,
                            indexing,
                            worker_count,
                            ..template.clone()
                        })
                    })
                    .collect()
            })
            .collect();
        Self::new(groups)
    }

    /// Parse a JSON sweep: either a list of configs (one group) or a list
    /// of lists (one group each). Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let sweep = match serde_json::from_str::<SweepFile>(json)? {
            SweepFile::Grouped(groups) => Self::new(groups),
            SweepFile::Flat(runs) => Self::new(vec![runs]),
        };
        sweep.validate()?;
        Ok(sweep)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(BenchError::InvalidConfig("sweep contains no runs".into()));
        }
        self.runs().try_for_each(BenchmarkConfig::validate)
    }

    pub fn groups(&self) -> &[Vec<BenchmarkConfig>] {
        &self.groups
    }

    pub fn runs(&self) -> impl Iterator<Item = &BenchmarkConfig> {
        self.groups.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
