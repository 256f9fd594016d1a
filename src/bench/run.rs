//! BenchmarkRun: one configuration, executed exactly once.
//!
//! Lifecycle: `Created → RootNodeReady → Running → {Completed | Failed} →
//! ShutDown`. A run owns its store (a fresh temporary directory unless a
//! store is injected), its worker pool and its name generator; all of
//! them are torn down when the run reaches `ShutDown`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::TempDir;

use crate::error::{BenchError, Result};
use crate::graph::{GraphEngine, GraphStore, NodeId};
use super::config::BenchmarkConfig;
use super::indexing::{Indexing, NodeFactory, LIKES};
use super::job::BatchJob;
use super::metrics::{JobMetrics, JobMetricsSnapshot};
use super::name_gen::NameGenerator;
use super::pool::WorkerPool;

const STORE_DIR_PREFIX: &str = "write-throughput-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Created,
    RootNodeReady,
    Running,
    Completed,
    Failed,
    ShutDown,
}

/// Outcome of a completed run. Never produced for a failed run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub batch_size: usize,
    pub indexing: Indexing,
    pub worker_count: usize,
    pub total_nodes: usize,
    /// Id of the node every `LIKES` edge points at.
    pub root: NodeId,
    pub jobs: usize,
    pub nodes_written: usize,
    pub elapsed_ms: u64,
    pub elapsed_us: u64,
    /// Nodes per second; `None` when the run took no measurable time.
    pub throughput_per_sec: Option<f64>,
    /// Committed nodes after the run, root included.
    pub nodes_in_store: usize,
    /// `LIKES` edges pointing at the root after the run.
    pub likes_edges: usize,
    pub metrics: JobMetricsSnapshot,
    /// Set when the store directory was kept.
    pub store_path: Option<PathBuf>,
}

impl BenchmarkResult {
    /// `Batch Size: 10, Indexing: UNIQUE, Threads: 4, Throughput: 1234`
    pub fn report_line(&self) -> String {
        let throughput = match self.throughput_per_sec {
            Some(t) => format!("{:.0}", t),
            None => "n/a".to_string(),
        };
        format!(
            "Batch Size: {}, Indexing: {}, Threads: {}, Throughput: {}",
            self.batch_size, self.indexing, self.worker_count, throughput
        )
    }
}

/// Nodes per second over `elapsed`, `None` for a zero interval.
pub fn throughput(nodes: usize, elapsed: Duration) -> Option<f64> {
    if elapsed.is_zero() {
        None
    } else {
        Some(nodes as f64 / elapsed.as_secs_f64())
    }
}

/// Resources alive between store open and `ShutDown`.
struct RunContext {
    store: Arc<dyn GraphStore>,
    store_dir: Option<TempDir>,
    pool: Option<WorkerPool>,
}

impl RunContext {
    fn teardown(self, keep_store: bool) {
        let RunContext { store, store_dir, pool } = self;
        if let Some(pool) = pool {
            if let Err(e) = pool.shutdown() {
                tracing::warn!("worker pool shutdown failed: {}", e);
            }
        }
        drop(store);

        if let Some(dir) = store_dir {
            if keep_store {
                #[allow(deprecated)]
                let path = dir.into_path();
                tracing::info!("store kept at {}", path.display());
            } else if let Err(e) = dir.close() {
                tracing::warn!("failed to remove store directory: {}", e);
            }
        }
    }
}

pub struct BenchmarkRun {
    config: BenchmarkConfig,
    injected_store: Option<Arc<dyn GraphStore>>,
    state: RunState,
    transitions: Vec<RunState>,
}

impl BenchmarkRun {
    /// Run against a fresh store in a temporary directory.
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            injected_store: None,
            state: RunState::Created,
            transitions: vec![RunState::Created],
        }
    }

    /// Run against a caller-supplied store.
    pub fn with_store(config: BenchmarkConfig, store: Arc<dyn GraphStore>) -> Self {
        Self {
            injected_store: Some(store),
            ..Self::new(config)
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state the run has been in, in order.
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    pub fn execute(&mut self) -> Result<BenchmarkResult> {
        if self.state != RunState::Created {
            return Err(BenchError::AlreadyExecuted);
        }

        let mut context = None;
        let outcome = self.drive(&mut context);
        match &outcome {
            Ok(_) => self.transition(RunState::Completed),
            Err(e) => {
                tracing::error!("run failed [{}]: {}", e.code(), e);
                self.transition(RunState::Failed);
            }
        }

        if let Some(context) = context {
            context.teardown(self.config.keep_store);
        }
        self.transition(RunState::ShutDown);
        outcome
    }

    fn transition(&mut self, next: RunState) {
        tracing::trace!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    fn drive(&mut self, context: &mut Option<RunContext>) -> Result<BenchmarkResult> {
        self.config.validate()?;
        let config = self.config.clone();

        // Generator failure is fatal before anything touches the store.
        let names = Arc::new(NameGenerator::new()?);
        let ctx = context.insert(self.open_store()?);
        let store = Arc::clone(&ctx.store);

        let root = create_root(&*store)?;
        self.transition(RunState::RootNodeReady);

        let factory = Arc::new(NodeFactory::new(
            config.indexing,
            config.payload,
            config.index_name.clone(),
            names,
        ));
        let jobs: Vec<BatchJob> = config
            .partition()
            .into_iter()
            .enumerate()
            .map(|(id, batch_size)| {
                BatchJob::new(id, Arc::clone(&store), Arc::clone(&factory), root, batch_size)
            })
            .collect();
        let job_count = jobs.len();

        let pool = ctx.pool.insert(WorkerPool::new(config.worker_count)?);
        let metrics = Arc::new(JobMetrics::new());
        let tasks: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let metrics = Arc::clone(&metrics);
                move || {
                    let outcome = job.run();
                    match &outcome {
                        Ok(done) => metrics.record_committed(done.job_id, done.elapsed),
                        Err(e) => {
                            metrics.record_failed();
                            tracing::warn!("job {} failed: {}", job.id(), e);
                        }
                    }
                    outcome
                }
            })
            .collect();

        tracing::info!(
            "run start: batch_size={} indexing={} threads={} jobs={}",
            config.batch_size,
            config.indexing,
            config.worker_count,
            job_count
        );
        self.transition(RunState::Running);

        let start = Instant::now();
        let outcomes = pool.submit_all(tasks)?;
        let elapsed = start.elapsed();

        let mut nodes_written = 0;
        let mut first_failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(done) => nodes_written += done.nodes_written,
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_failure {
            return Err(e);
        }

        let result = BenchmarkResult {
            batch_size: config.batch_size,
            indexing: config.indexing,
            worker_count: config.worker_count,
            total_nodes: config.total_nodes,
            root,
            jobs: job_count,
            nodes_written,
            elapsed_ms: elapsed.as_millis() as u64,
            elapsed_us: elapsed.as_micros() as u64,
            throughput_per_sec: throughput(nodes_written, elapsed),
            nodes_in_store: store.node_count(),
            likes_edges: store.incoming_edges(root, Some(LIKES)).len(),
            metrics: metrics.snapshot(),
            store_path: match (&ctx.store_dir, config.keep_store) {
                (Some(dir), true) => Some(dir.path().to_path_buf()),
                _ => None,
            },
        };

        tracing::info!(
            "run finished: {} nodes in {}ms ({} jobs, p99 {}us)",
            result.nodes_written,
            result.elapsed_ms,
            result.jobs,
            result.metrics.job_p99_us
        );
        Ok(result)
    }

    fn open_store(&self) -> Result<RunContext> {
        if let Some(store) = &self.injected_store {
            return Ok(RunContext {
                store: Arc::clone(store),
                store_dir: None,
                pool: None,
            });
        }

        let root = self.config.store_root.clone().unwrap_or_else(std::env::temp_dir);
        let dir = tempfile::Builder::new()
            .prefix(STORE_DIR_PREFIX)
            .tempdir_in(&root)
            .map_err(|e| BenchError::StoreUnavailable {
                path: root.clone(),
                reason: e.to_string(),
            })?;
        let engine = GraphEngine::create(dir.path(), self.config.store_options()).map_err(|e| {
            BenchError::StoreUnavailable {
                path: dir.path().to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        tracing::debug!("store opened at {}", dir.path().display());

        Ok(RunContext {
            store: Arc::new(engine),
            store_dir: Some(dir),
            pool: None,
        })
    }
}

/// The root gets its own single-node transaction.
fn create_root(store: &dyn GraphStore) -> Result<NodeId> {
    let mut tx = store.begin_tx()?;
    let root = tx.create_node()?;
    tx.success();
    tx.close()?;
    Ok(root)
}
