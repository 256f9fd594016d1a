//! In-memory write buffer for one open transaction.
//!
//! Holds everything the transaction wrote until commit turns it into a
//! `CommitRecord`. NOT Send+Sync -- owned by a single transaction.
//!
//! New nodes are keyed by id for O(1) lookup; property writes against
//! already-committed nodes are kept as an ordered update list.

use std::collections::HashMap;

use crate::graph::NodeId;
use crate::storage::{CommitRecord, EdgeRecord, IndexKey, NodeRecord, PropertyUpdate, PropertyValue};

pub struct WriteBuffer {
    /// Nodes created by this transaction.
    nodes: HashMap<NodeId, NodeRecord>,

    /// Property writes against nodes created by earlier transactions.
    property_updates: Vec<PropertyUpdate>,

    edges: Vec<EdgeRecord>,

    /// Unique index entries registered by this transaction.
    index_entries: HashMap<IndexKey, NodeId>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            property_updates: Vec::new(),
            edges: Vec::new(),
            index_entries: HashMap::new(),
        }
    }

    // -- Write Operations -----------------------------------------------------

    pub fn add_node(&mut self, id: NodeId) {
        self.nodes.insert(id, NodeRecord::new(id));
    }

    /// Set a property on a node.
    ///
    /// Nodes created in this buffer are updated in place; anything else is
    /// recorded as an update against committed state. The caller checks
    /// that committed nodes exist.
    pub fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue) {
        match self.nodes.get_mut(&node) {
            Some(record) => {
                record.properties.insert(key.to_string(), value);
            }
            None => self.property_updates.push(PropertyUpdate {
                node,
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn add_edge(&mut self, edge: EdgeRecord) {
        self.edges.push(edge);
    }

    pub fn add_index_entry(&mut self, key: IndexKey, node: NodeId) {
        self.index_entries.insert(key, node);
    }

    // -- Read Operations ------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn lookup_index(&self, key: &IndexKey) -> Option<NodeId> {
        self.index_entries.get(key).copied()
    }

    /// Pending property updates for a committed node, oldest first.
    pub fn updates_for(&self, node: NodeId) -> impl Iterator<Item = &PropertyUpdate> {
        self.property_updates.iter().filter(move |u| u.node == node)
    }

    // -- Buffer Management ----------------------------------------------------

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.property_updates.is_empty()
            && self.edges.is_empty()
            && self.index_entries.is_empty()
    }

    /// Consume the buffer into a commit record. Nodes are ordered by id so
    /// the log is deterministic for a given transaction.
    pub fn into_commit_record(self, tx_id: u64) -> CommitRecord {
        let mut nodes: Vec<NodeRecord> = self.nodes.into_values().collect();
        nodes.sort_unstable_by_key(|n| n.id);

        CommitRecord {
            tx_id,
            nodes,
            property_updates: self.property_updates,
            edges: self.edges,
            index_entries: self.index_entries.into_iter().collect(),
        }
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}
