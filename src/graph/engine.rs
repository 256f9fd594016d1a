//! GraphEngine: embedded transactional graph store.
//!
//! Committed state lives in memory behind one `RwLock`. Commits are
//! serialized by a separate sequencing mutex: each is appended to the
//! commit log (unless ephemeral) and then applied under a brief write
//! lock, so log order equals apply order and readers never wait on a
//! log sync. Open
//! transactions buffer their writes in a `WriteBuffer` and only touch
//! shared state at commit.
//!
//! Node ids come from an atomic counter and are never reused, including
//! ids handed out to transactions that later rolled back.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::storage::{
    CommitLog, CommitRecord, DurabilityMode, EdgeRecord, IndexKey, NodeRecord, PropertyValue,
    WriteBuffer,
};
use super::unique_index::{Reservation, TxId, UniqueIndex};
use super::{GraphStore, NodeId, NodeInitializer, Transaction, TxHandle};

/// Default bound on how long get-or-create waits for a contended key.
pub const DEFAULT_LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Store tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub durability: DurabilityMode,
    pub lock_wait_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            durability: DurabilityMode::Sync,
            lock_wait_timeout: DEFAULT_LOCK_WAIT_TIMEOUT,
        }
    }
}

impl StoreOptions {
    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }
}

/// Commit/rollback counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub commits: u64,
    pub rollbacks: u64,
    pub log_bytes: u64,
}

// ── Committed State ────────────────────────────────────────────────

#[derive(Default)]
struct CommittedState {
    nodes: HashMap<NodeId, NodeRecord>,
    edges: Vec<EdgeRecord>,
    /// dst → positions in `edges`
    incoming: HashMap<NodeId, Vec<usize>>,
    edge_type_counts: HashMap<String, usize>,
    indexes: HashMap<IndexKey, NodeId>,
}

impl CommittedState {
    fn apply(&mut self, record: CommitRecord) {
        for node in record.nodes {
            self.nodes.insert(node.id, node);
        }
        for update in record.property_updates {
            if let Some(node) = self.nodes.get_mut(&update.node) {
                node.properties.insert(update.key, update.value);
            }
        }
        for edge in record.edges {
            *self.edge_type_counts.entry(edge.edge_type.clone()).or_insert(0) += 1;
            self.incoming.entry(edge.dst).or_default().push(self.edges.len());
            self.edges.push(edge);
        }
        for (key, node) in record.index_entries {
            self.indexes.entry(key).or_insert(node);
        }
    }

    fn max_node_id(&self) -> Option<NodeId> {
        self.nodes.keys().copied().max()
    }
}

// ── GraphEngine ────────────────────────────────────────────────────

pub struct GraphEngine {
    options: StoreOptions,
    state: RwLock<CommittedState>,
    /// Held across log append and apply.
    commit_seq: Mutex<()>,
    log: Option<CommitLog>,
    unique: UniqueIndex,
    next_node_id: AtomicU64,
    next_tx_id: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    log_bytes: AtomicU64,
}

impl GraphEngine {
    /// Create a new persistent store in `path` (created if absent).
    pub fn create(path: &Path, options: StoreOptions) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let log = CommitLog::create(path, options.durability)?;
        tracing::debug!("created store at {} ({})", path.display(), options.durability.as_str());
        Ok(Self::with_parts(options, Some(log), CommittedState::default()))
    }

    /// Reopen a persistent store, replaying its commit log.
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        let (log, records) = CommitLog::open(path, options.durability)?;
        let replayed = records.len();
        let mut state = CommittedState::default();
        for record in records {
            state.apply(record);
        }
        tracing::debug!("opened store at {}: replayed {} commits", path.display(), replayed);
        Ok(Self::with_parts(options, Some(log), state))
    }

    /// In-memory store without a commit log.
    pub fn create_ephemeral() -> Self {
        Self::with_parts(StoreOptions::default(), None, CommittedState::default())
    }

    /// In-memory store with custom options (durability is ignored).
    pub fn create_ephemeral_with(options: StoreOptions) -> Self {
        Self::with_parts(options, None, CommittedState::default())
    }

    fn with_parts(
        options: StoreOptions,
        log: Option<CommitLog>,
        state: CommittedState,
    ) -> Self {
        let next_node_id = state.max_node_id().map_or(0, |id| id + 1);
        Self {
            options,
            state: RwLock::new(state),
            commit_seq: Mutex::new(()),
            log,
            unique: UniqueIndex::new(),
            next_node_id: AtomicU64::new(next_node_id),
            next_tx_id: AtomicU64::new(1),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            log_bytes: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            log_bytes: self.log_bytes.load(Ordering::Relaxed),
        }
    }

    /// Begin a transaction without the `TxHandle` guard.
    ///
    /// An `EngineTx` dropped while still open rolls back.
    pub fn transaction(&self) -> EngineTx<'_> {
        EngineTx {
            engine: self,
            id: self.next_tx_id.fetch_add(1, Ordering::Relaxed),
            buffer: WriteBuffer::new(),
            reserved: Vec::new(),
            state: TxState::Open,
        }
    }

    fn committed_node_exists(&self, id: NodeId) -> bool {
        self.state.read().unwrap().nodes.contains_key(&id)
    }

    fn committed_index(&self, key: &IndexKey) -> Option<NodeId> {
        self.state.read().unwrap().indexes.get(key).copied()
    }

    fn allocate_node_id(&self) -> NodeId {
        self.next_node_id.fetch_add(1, Ordering::Relaxed)
    }

    fn commit_buffer(&self, tx_id: TxId, buffer: WriteBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let record = buffer.into_commit_record(tx_id);
        let (nodes, edges) = (record.nodes.len(), record.edges.len());

        let _seq = self.commit_seq.lock().unwrap();
        if let Some(log) = &self.log {
            let written = log.append(&record)?;
            self.log_bytes.fetch_add(written as u64, Ordering::Relaxed);
        }
        self.state.write().unwrap().apply(record);

        tracing::trace!("tx {} committed: {} nodes, {} edges", tx_id, nodes, edges);
        Ok(())
    }
}

impl GraphStore for GraphEngine {
    fn begin_tx(&self) -> Result<TxHandle<'_>> {
        Ok(TxHandle::new(Box::new(self.transaction())))
    }

    fn get_node_by_id(&self, id: NodeId) -> Option<NodeRecord> {
        self.state.read().unwrap().nodes.get(&id).cloned()
    }

    fn node_count(&self) -> usize {
        self.state.read().unwrap().nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.state.read().unwrap().edges.len()
    }

    fn count_edges_by_type(&self, edge_type: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .edge_type_counts
            .get(edge_type)
            .copied()
            .unwrap_or(0)
    }

    fn incoming_edges(&self, id: NodeId, edge_type: Option<&str>) -> Vec<EdgeRecord> {
        let state = self.state.read().unwrap();
        state
            .incoming
            .get(&id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| &state.edges[pos])
                    .filter(|e| edge_type.map_or(true, |t| e.edge_type == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn index_lookup(&self, index: &str, key: &str, value: &str) -> Option<NodeId> {
        self.committed_index(&IndexKey::new(index, key, value))
    }
}

// ── Transactions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// Open transaction against a `GraphEngine`
pub struct EngineTx<'a> {
    engine: &'a GraphEngine,
    id: TxId,
    buffer: WriteBuffer,
    /// Unique keys this transaction reserved; released on commit/rollback.
    reserved: Vec<IndexKey>,
    state: TxState,
}

impl<'a> EngineTx<'a> {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BenchError::TransactionClosed)
        }
    }

    fn node_visible(&self, id: NodeId) -> bool {
        self.buffer.contains_node(id) || self.engine.committed_node_exists(id)
    }

    fn release_reservations(&mut self) {
        let reserved = std::mem::take(&mut self.reserved);
        self.engine.unique.release_all(self.id, &reserved);
    }
}

impl Transaction for EngineTx<'_> {
    fn create_node(&mut self) -> Result<NodeId> {
        self.ensure_open()?;
        let id = self.engine.allocate_node_id();
        self.buffer.add_node(id);
        Ok(id)
    }

    fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue) -> Result<()> {
        self.ensure_open()?;
        if !self.node_visible(node) {
            return Err(BenchError::NodeNotFound(node));
        }
        self.buffer.set_property(node, key, value);
        Ok(())
    }

    fn create_relationship(&mut self, src: NodeId, dst: NodeId, edge_type: &str) -> Result<()> {
        self.ensure_open()?;
        for id in [src, dst] {
            if !self.node_visible(id) {
                return Err(BenchError::NodeNotFound(id));
            }
        }
        self.buffer.add_edge(EdgeRecord {
            src,
            dst,
            edge_type: edge_type.to_string(),
        });
        Ok(())
    }

    fn get_node(&self, id: NodeId) -> Option<NodeRecord> {
        if let Some(node) = self.buffer.get_node(id) {
            return Some(node.clone());
        }
        let mut node = self.engine.get_node_by_id(id)?;
        for update in self.buffer.updates_for(id) {
            node.properties.insert(update.key.clone(), update.value.clone());
        }
        Some(node)
    }

    fn get_or_create(
        &mut self,
        index: &str,
        key: &str,
        value: &str,
        initializer: &mut NodeInitializer<'_>,
    ) -> Result<NodeId> {
        self.ensure_open()?;
        let index_key = IndexKey::new(index, key, value);

        if let Some(node) = self.buffer.lookup_index(&index_key) {
            return Ok(node);
        }

        let engine = self.engine;
        if let Some(node) = engine.committed_index(&index_key) {
            return Ok(node);
        }

        let reservation = engine.unique.reserve(
            &index_key,
            self.id,
            engine.options.lock_wait_timeout,
            |k| engine.committed_index(k),
        )?;

        match reservation {
            Reservation::Existing(node) => Ok(node),
            Reservation::Acquired => {
                self.reserved.push(index_key.clone());
                let node = self.create_node()?;
                initializer(self, node)?;
                self.buffer.add_index_entry(index_key, node);
                Ok(node)
            }
        }
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = TxState::Committed;

        let buffer = std::mem::take(&mut self.buffer);
        let result = self.engine.commit_buffer(self.id, buffer);
        self.release_reservations();

        match &result {
            Ok(()) => {
                self.engine.commits.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.engine.rollbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("tx {} commit failed, writes discarded: {}", self.id, e);
            }
        }
        result
    }

    fn rollback(&mut self) {
        if !self.is_open() {
            return;
        }
        self.state = TxState::RolledBack;
        self.buffer = WriteBuffer::new();
        self.release_reservations();
        self.engine.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("tx {} rolled back", self.id);
    }
}

impl Drop for EngineTx<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}
