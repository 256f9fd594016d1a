//! BatchJob: one transaction's worth of synthetic writes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::graph::{GraphStore, NodeId};
use super::indexing::{NodeFactory, LIKES};

/// Result of a committed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: usize,
    pub nodes_written: usize,
    pub elapsed: Duration,
}

/// Creates `batch_size` nodes, each linked `LIKES` to the root, in a
/// single transaction. All-or-nothing: any error rolls the whole batch
/// back and is returned as a `TransactionFailure` for this job.
#[derive(Clone)]
pub struct BatchJob {
    id: usize,
    store: Arc<dyn GraphStore>,
    factory: Arc<NodeFactory>,
    root: NodeId,
    batch_size: usize,
}

impl BatchJob {
    pub fn new(
        id: usize,
        store: Arc<dyn GraphStore>,
        factory: Arc<NodeFactory>,
        root: NodeId,
        batch_size: usize,
    ) -> Self {
        Self {
            id,
            store,
            factory,
            root,
            batch_size,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn run(&self) -> Result<JobOutcome> {
        let start = Instant::now();
        self.write_batch().map_err(|e| e.in_job(self.id))?;
        let elapsed = start.elapsed();

        tracing::debug!(
            "job {} committed {} nodes in {:?}",
            self.id,
            self.batch_size,
            elapsed
        );
        Ok(JobOutcome {
            job_id: self.id,
            nodes_written: self.batch_size,
            elapsed,
        })
    }

    fn write_batch(&self) -> Result<()> {
        // On early return the handle rolls back in Drop.
        let mut tx = self.store.begin_tx()?;
        for _ in 0..self.batch_size {
            let node = self.factory.create_next(&mut *tx)?;
            tx.create_relationship(node, self.root, LIKES)?;
        }
        tx.success();
        tx.close()
    }
}

impl std::fmt::Debug for BatchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchJob")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
