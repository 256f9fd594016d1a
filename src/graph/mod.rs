//! Graph store API: the collaborator the benchmark engine writes through.
//!
//! `GraphStore` is shared by every worker thread; each batch runs inside
//! one `Transaction`, held through a `TxHandle` guard that closes it on
//! every exit path.

pub mod engine;
pub mod unique_index;

pub use engine::{EngineTx, GraphEngine, StoreOptions};
pub use unique_index::UniqueIndex;

use std::fmt;

use crate::error::{BenchError, Result};
use crate::storage::{EdgeRecord, NodeRecord, PropertyValue};

/// Store-assigned node identity
pub type NodeId = u64;

/// Initializer run by `get_or_create` on a freshly created node, inside the
/// same transaction, before the index entry becomes visible to others.
pub type NodeInitializer<'f> = dyn FnMut(&mut dyn Transaction, NodeId) -> Result<()> + 'f;

/// Shared, thread-safe graph store
///
/// Send + Sync required: one handle is shared by all worker threads.
pub trait GraphStore: Send + Sync {
    /// Begin a transaction. Dropping the handle without closing it rolls back.
    fn begin_tx(&self) -> Result<TxHandle<'_>>;

    /// Committed node by id
    fn get_node_by_id(&self, id: NodeId) -> Option<NodeRecord>;

    /// Number of committed nodes
    fn node_count(&self) -> usize;

    /// Number of committed edges
    fn edge_count(&self) -> usize;

    /// Number of committed edges with the given label
    fn count_edges_by_type(&self, edge_type: &str) -> usize;

    /// Committed edges pointing at `id`, optionally filtered by label
    fn incoming_edges(&self, id: NodeId, edge_type: Option<&str>) -> Vec<EdgeRecord>;

    /// Committed unique index lookup
    fn index_lookup(&self, index: &str, key: &str, value: &str) -> Option<NodeId>;
}

/// Write operations of one open transaction
pub trait Transaction {
    /// Create an empty node
    fn create_node(&mut self) -> Result<NodeId>;

    /// Set a property on a committed node or one created in this transaction
    fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue) -> Result<()>;

    /// Create a directed `src -edge_type-> dst` relationship
    fn create_relationship(&mut self, src: NodeId, dst: NodeId, edge_type: &str) -> Result<()>;

    /// Read a node as seen by this transaction (own writes included)
    fn get_node(&self, id: NodeId) -> Option<NodeRecord>;

    /// Atomic get-or-create against the unique index `index` on `key = value`.
    ///
    /// Returns the existing node if one is registered (committed, or written
    /// earlier in this transaction); otherwise creates a node, runs
    /// `initializer` on it and registers it. Concurrent callers racing on
    /// the same key observe a single node.
    fn get_or_create(
        &mut self,
        index: &str,
        key: &str,
        value: &str,
        initializer: &mut NodeInitializer<'_>,
    ) -> Result<NodeId>;

    /// Make the transaction's writes durable and visible
    fn commit(&mut self) -> Result<()>;

    /// Discard the transaction's writes
    fn rollback(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxOutcome {
    Pending,
    Success,
}

/// Scoped transaction guard.
///
/// `success()` marks the transaction for commit; `close()` commits if
/// marked, otherwise rolls back. A handle dropped without `close()` (early
/// return, `?`, panic) is closed by `Drop` with the same rule.
pub struct TxHandle<'a> {
    tx: Box<dyn Transaction + 'a>,
    outcome: TxOutcome,
    closed: bool,
}

impl<'a> TxHandle<'a> {
    pub fn new(tx: Box<dyn Transaction + 'a>) -> Self {
        Self {
            tx,
            outcome: TxOutcome::Pending,
            closed: false,
        }
    }

    /// Mark the transaction for commit on close
    pub fn success(&mut self) {
        self.outcome = TxOutcome::Success;
    }

    /// Close the transaction: commit if marked successful, else roll back.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Err(BenchError::TransactionClosed);
        }
        self.closed = true;
        match self.outcome {
            TxOutcome::Success => self.tx.commit(),
            TxOutcome::Pending => {
                self.tx.rollback();
                Ok(())
            }
        }
    }
}

impl<'a> std::ops::Deref for TxHandle<'a> {
    type Target = dyn Transaction + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.tx
    }
}

impl<'a> std::ops::DerefMut for TxHandle<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.tx
    }
}

impl Drop for TxHandle<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.outcome == TxOutcome::Pending {
            tracing::debug!("transaction dropped without close, rolling back");
        }
        if let Err(e) = self.finish() {
            tracing::warn!("closing dropped transaction failed: {}", e);
        }
    }
}

impl fmt::Debug for TxHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle")
            .field("outcome", &self.outcome)
            .field("closed", &self.closed)
            .finish()
    }
}
