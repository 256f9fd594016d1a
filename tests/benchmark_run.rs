//! Integration test: whole benchmark runs against the embedded store.
//!
//! Validates that:
//! - A successful run commits exactly the partitioned node count, each
//!   node with one LIKES edge to the root
//! - Unique runs never share a name; forced duplicate names resolve to
//!   one node
//! - Thread count changes timing only, never the final counts
//! - A failing batch rolls back entirely, siblings still commit, and the
//!   run reports failure instead of a throughput number
//! - An unusable store location fails the run before any job is submitted

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use write_throughput::bench::{
    BenchmarkConfig, BenchmarkRun, Indexing, NameGenerator, NodeFactory, NodePayload,
    RemainderPolicy, RunState, DEFAULT_INDEX_NAME, LIKES, NAME_KEY,
};
use write_throughput::graph::{EngineTx, NodeInitializer};
use write_throughput::storage::{EdgeRecord, NodeRecord, PropertyValue};
use write_throughput::{
    BenchError, DurabilityMode, GraphEngine, GraphStore, NodeId, Result, Transaction, TxHandle,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(batch_size: usize, indexing: Indexing, workers: usize) -> BenchmarkConfig {
    BenchmarkConfig::new(batch_size, indexing, workers).durability(DurabilityMode::Buffered)
}

fn names_linked_to(store: &dyn GraphStore, root: NodeId) -> Vec<String> {
    store
        .incoming_edges(root, Some(LIKES))
        .iter()
        .map(|edge| {
            let node = store.get_node_by_id(edge.src).expect("edge source committed");
            node.property(NAME_KEY)
                .and_then(|v| v.as_str())
                .expect("named node")
                .to_string()
        })
        .collect()
}

/// Store wrapper that fails the `fail_at`-th relationship created through
/// it (counting across all transactions).
struct FaultyStore {
    engine: GraphEngine,
    relationships: AtomicUsize,
    fail_at: usize,
}

impl FaultyStore {
    fn new(fail_at: usize) -> Self {
        Self {
            engine: GraphEngine::create_ephemeral(),
            relationships: AtomicUsize::new(0),
            fail_at,
        }
    }
}

struct FaultyTx<'a> {
    inner: EngineTx<'a>,
    store: &'a FaultyStore,
}

impl Transaction for FaultyTx<'_> {
    fn create_node(&mut self) -> Result<NodeId> {
        self.inner.create_node()
    }

    fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue) -> Result<()> {
        self.inner.set_property(node, key, value)
    }

    fn create_relationship(&mut self, src: NodeId, dst: NodeId, edge_type: &str) -> Result<()> {
        let n = self.store.relationships.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.store.fail_at {
            return Err(BenchError::InvalidFormat(format!("injected failure at relationship {}", n)));
        }
        self.inner.create_relationship(src, dst, edge_type)
    }

    fn get_node(&self, id: NodeId) -> Option<NodeRecord> {
        self.inner.get_node(id)
    }

    fn get_or_create(
        &mut self,
        index: &str,
        key: &str,
        value: &str,
        initializer: &mut NodeInitializer<'_>,
    ) -> Result<NodeId> {
        self.inner.get_or_create(index, key, value, initializer)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) {
        self.inner.rollback()
    }
}

impl GraphStore for FaultyStore {
    fn begin_tx(&self) -> Result<TxHandle<'_>> {
        Ok(TxHandle::new(Box::new(FaultyTx {
            inner: self.engine.transaction(),
            store: self,
        })))
    }

    fn get_node_by_id(&self, id: NodeId) -> Option<NodeRecord> {
        self.engine.get_node_by_id(id)
    }

    fn node_count(&self) -> usize {
        self.engine.node_count()
    }

    fn edge_count(&self) -> usize {
        self.engine.edge_count()
    }

    fn count_edges_by_type(&self, edge_type: &str) -> usize {
        self.engine.count_edges_by_type(edge_type)
    }

    fn incoming_edges(&self, id: NodeId, edge_type: Option<&str>) -> Vec<EdgeRecord> {
        self.engine.incoming_edges(id, edge_type)
    }

    fn index_lookup(&self, index: &str, key: &str, value: &str) -> Option<NodeId> {
        self.engine.index_lookup(index, key, value)
    }
}

// ---------------------------------------------------------------------------
// Tests: Successful Runs
// ---------------------------------------------------------------------------

#[test]
fn plain_batch_of_ten_on_four_threads() {
    let mut run = BenchmarkRun::new(config(10, Indexing::Plain, 4));
    let result = run.execute().unwrap();

    assert_eq!(result.jobs, 100);
    assert_eq!(result.nodes_written, 1000);
    assert_eq!(result.nodes_in_store, 1001, "1000 synthetic nodes plus the root");
    assert_eq!(result.likes_edges, 1000);
    assert!(result.throughput_per_sec.unwrap() > 0.0);
    assert_eq!(run.state(), RunState::ShutDown);
}

#[test]
fn every_node_has_one_likes_edge_to_root() {
    let store = Arc::new(GraphEngine::create_ephemeral());
    let mut run = BenchmarkRun::with_store(config(20, Indexing::Unique, 3).total_nodes(200), store.clone());
    let result = run.execute().unwrap();

    assert_eq!(store.edge_count(), 200);
    assert_eq!(store.count_edges_by_type(LIKES), 200);
    let edges = store.incoming_edges(result.root, Some(LIKES));
    let sources: HashSet<NodeId> = edges.iter().map(|e| e.src).collect();
    assert_eq!(sources.len(), 200, "one edge per synthetic node");
    assert!(!sources.contains(&result.root));
}

#[test]
fn unique_names_are_pairwise_distinct() {
    let store = Arc::new(GraphEngine::create_ephemeral());
    let mut run = BenchmarkRun::with_store(config(5, Indexing::Unique, 8).total_nodes(500), store.clone());
    let result = run.execute().unwrap();

    let names = names_linked_to(&*store, result.root);
    let distinct: HashSet<&String> = names.iter().collect();
    assert_eq!(names.len(), 500);
    assert_eq!(distinct.len(), 500);
    for name in &names {
        assert!(store.index_lookup(DEFAULT_INDEX_NAME, NAME_KEY, name).is_some());
    }
}

#[test]
fn plain_runs_write_no_index_entries() {
    let store = Arc::new(GraphEngine::create_ephemeral());
    let mut run = BenchmarkRun::with_store(config(10, Indexing::Plain, 2).total_nodes(50), store.clone());
    let result = run.execute().unwrap();

    for name in names_linked_to(&*store, result.root) {
        assert_eq!(store.index_lookup(DEFAULT_INDEX_NAME, NAME_KEY, &name), None);
    }
}

#[test]
fn thread_count_does_not_change_counts() {
    for indexing in [Indexing::Unique, Indexing::Plain] {
        let counts: Vec<(usize, usize)> = [1, 4, 16]
            .iter()
            .map(|&workers| {
                let result = BenchmarkRun::new(config(10, indexing, workers).total_nodes(300))
                    .execute()
                    .unwrap();
                (result.nodes_in_store, result.likes_edges)
            })
            .collect();
        assert!(counts.iter().all(|&c| c == (301, 300)), "{:?}: {:?}", indexing, counts);
    }
}

#[test]
fn remainder_is_dropped_by_default() {
    let result = BenchmarkRun::new(config(300, Indexing::Plain, 2)).execute().unwrap();
    assert_eq!(result.jobs, 3);
    assert_eq!(result.nodes_written, 900);
    assert_eq!(result.likes_edges, 900);
}

#[test]
fn final_batch_writes_exact_total() {
    let cfg = config(300, Indexing::Unique, 2).remainder(RemainderPolicy::FinalBatch);
    let result = BenchmarkRun::new(cfg).execute().unwrap();
    assert_eq!(result.jobs, 4);
    assert_eq!(result.nodes_written, 1000);
    assert_eq!(result.likes_edges, 1000);
}

#[test]
fn throughput_matches_elapsed_time() {
    let result = BenchmarkRun::new(config(10, Indexing::Plain, 2).payload(NodePayload::Minimal))
        .execute()
        .unwrap();
    let expected = result.nodes_written as f64 * 1_000_000.0 / result.elapsed_us as f64;
    let measured = result.throughput_per_sec.unwrap();
    assert!((measured - expected).abs() / expected < 0.01, "{} vs {}", measured, expected);
}

#[test]
fn result_serializes_to_json() {
    let result = BenchmarkRun::new(config(50, Indexing::Unique, 2)).execute().unwrap();
    let json: serde_json::Value = serde_json::to_value(&result).unwrap();
    assert_eq!(json["batch_size"], 50);
    assert_eq!(json["indexing"], "unique");
    assert_eq!(json["nodes_written"], 1000);
    assert_eq!(json["metrics"]["jobs_committed"], 20);
}

// ---------------------------------------------------------------------------
// Tests: Forced Names
// ---------------------------------------------------------------------------

#[test]
fn forced_duplicate_names_resolve_to_existing_nodes() {
    let engine = GraphEngine::create_ephemeral();
    let factory = NodeFactory::new(
        Indexing::Unique,
        NodePayload::Rich,
        DEFAULT_INDEX_NAME,
        Arc::new(NameGenerator::new().unwrap()),
    );

    let mut ids = Vec::new();
    for name in ["first", "second", "first", "second", "first"] {
        let mut tx = engine.begin_tx().unwrap();
        ids.push(factory.create(&mut *tx, name).unwrap());
        tx.success();
        tx.close().unwrap();
    }

    assert_eq!(ids[0], ids[2]);
    assert_eq!(ids[0], ids[4]);
    assert_eq!(ids[1], ids[3]);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(engine.node_count(), 2, "distinct names, not calls");
}

#[test]
fn forced_duplicate_names_under_plain_create_new_nodes() {
    let engine = GraphEngine::create_ephemeral();
    let factory = NodeFactory::new(
        Indexing::Plain,
        NodePayload::Minimal,
        DEFAULT_INDEX_NAME,
        Arc::new(NameGenerator::new().unwrap()),
    );

    let mut tx = engine.begin_tx().unwrap();
    for _ in 0..3 {
        factory.create(&mut *tx, "same").unwrap();
    }
    tx.success();
    tx.close().unwrap();
    assert_eq!(engine.node_count(), 3);
}

// ---------------------------------------------------------------------------
// Tests: Failures
// ---------------------------------------------------------------------------

#[test]
fn failing_batch_rolls_back_and_fails_run() {
    let store = Arc::new(FaultyStore::new(35));
    let mut run = BenchmarkRun::with_store(config(10, Indexing::Plain, 4).total_nodes(100), store.clone());

    let err = run.execute().unwrap_err();
    assert_eq!(err.code(), "TRANSACTION_FAILURE");
    assert!(err.to_string().contains("injected failure"), "{}", err);

    // The failing job contributes nothing; its nine siblings still commit
    assert_eq!(store.node_count(), 1 + 90);
    assert_eq!(store.count_edges_by_type(LIKES), 90);
    assert_eq!(
        run.transitions(),
        &[
            RunState::Created,
            RunState::RootNodeReady,
            RunState::Running,
            RunState::Failed,
            RunState::ShutDown
        ]
    );
}

#[test]
fn failing_unique_batch_releases_its_names() {
    let store = Arc::new(FaultyStore::new(1));
    let mut run = BenchmarkRun::with_store(config(5, Indexing::Unique, 1).total_nodes(10), store.clone());
    assert!(run.execute().is_err());

    // Only the second job committed
    assert_eq!(store.node_count(), 1 + 5);
    assert_eq!(store.count_edges_by_type(LIKES), 5);
}

#[test]
fn unusable_store_root_fails_before_any_job() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("plain-file");
    std::fs::write(&not_a_dir, b"occupied").unwrap();

    let mut run = BenchmarkRun::new(config(10, Indexing::Plain, 2).store_root(&not_a_dir));
    let err = run.execute().unwrap_err();

    assert_eq!(err.code(), "STORE_UNAVAILABLE");
    assert!(matches!(&err, BenchError::StoreUnavailable { path, .. } if path == &not_a_dir));
    assert_eq!(
        run.transitions(),
        &[RunState::Created, RunState::Failed, RunState::ShutDown]
    );
}
