//! Integration test: larger runs and heavy thread oversubscription.
//!
//! Validates correctness under load, not performance: counts stay exact
//! and unique names stay unique with many more threads than cores.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use write_throughput::bench::{
    BenchmarkConfig, BenchmarkRun, Indexing, NodePayload, RemainderPolicy, LIKES, NAME_KEY,
};
use write_throughput::{DurabilityMode, GraphEngine, GraphStore};

fn buffered(batch_size: usize, indexing: Indexing, workers: usize) -> BenchmarkConfig {
    BenchmarkConfig::new(batch_size, indexing, workers).durability(DurabilityMode::Buffered)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn stress_classic_sweep_counts() {
    for batch_size in [1, 10] {
        for workers in [1, 4, 16, 32, 100] {
            let result = BenchmarkRun::new(buffered(batch_size, Indexing::Unique, workers))
                .execute()
                .unwrap();
            assert_eq!(result.nodes_written, 1000, "batch {} threads {}", batch_size, workers);
            assert_eq!(result.likes_edges, 1000);
            assert_eq!(result.nodes_in_store, 1001);
        }
    }
}

#[test]
fn stress_20k_unique_nodes_on_64_threads() {
    let store = Arc::new(GraphEngine::create_ephemeral());
    let config = buffered(25, Indexing::Unique, 64).total_nodes(20_000);
    let result = BenchmarkRun::with_store(config, store.clone()).execute().unwrap();

    assert_eq!(result.jobs, 800);
    assert_eq!(store.node_count(), 20_001);

    let names: HashSet<String> = store
        .incoming_edges(result.root, Some(LIKES))
        .iter()
        .filter_map(|e| store.get_node_by_id(e.src))
        .filter_map(|n| n.property(NAME_KEY).and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(names.len(), 20_000);
}

#[test]
fn stress_synced_commits_with_rich_payload() {
    let config = BenchmarkConfig::new(50, Indexing::Plain, 8)
        .total_nodes(2_000)
        .payload(NodePayload::Rich);
    let result = BenchmarkRun::new(config).execute().unwrap();
    assert_eq!(result.likes_edges, 2_000);
    assert_eq!(result.metrics.jobs_committed, 40);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_run_writes_partitioned_count(
        total in 1usize..400,
        batch in 1usize..64,
        workers in 1usize..12,
        unique in any::<bool>(),
        exact in any::<bool>(),
    ) {
        let indexing = if unique { Indexing::Unique } else { Indexing::Plain };
        let remainder = if exact { RemainderPolicy::FinalBatch } else { RemainderPolicy::Drop };
        let config = buffered(batch, indexing, workers)
            .total_nodes(total)
            .payload(NodePayload::Minimal)
            .remainder(remainder);
        let expected = config.nodes_to_write();

        let result = BenchmarkRun::new(config).execute().unwrap();
        prop_assert_eq!(result.nodes_written, expected);
        prop_assert_eq!(result.likes_edges, expected);
        prop_assert_eq!(result.nodes_in_store, expected + 1);
    }
}
