//! Record types, per-transaction write buffer and the append-only commit log

pub mod commit_log;
pub mod write_buffer;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

pub use commit_log::{CommitLog, DurabilityMode};
pub use write_buffer::WriteBuffer;

/// Property value stored on a node.
///
/// The benchmark payload only needs longs and strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Long(i64),
    String(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            PropertyValue::Long(_) => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(v) => Some(*v),
            PropertyValue::String(_) => None,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::String(s) => f.write_str(s),
        }
    }
}

/// Node record: store-assigned id plus its properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl NodeRecord {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            properties: BTreeMap::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// Directed, typed relationship between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: NodeId,
    pub dst: NodeId,
    /// Relationship label, e.g. "LIKES"
    pub edge_type: String,
}

/// Key of a unique secondary index entry: (index name, key, value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub index: String,
    pub key: String,
    pub value: String,
}

impl IndexKey {
    pub fn new(index: &str, key: &str, value: &str) -> Self {
        Self {
            index: index.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Property write against a node that was committed by an earlier transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub node: NodeId,
    pub key: String,
    pub value: PropertyValue,
}

/// Everything one transaction changed. Unit of the commit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub tx_id: u64,
    pub nodes: Vec<NodeRecord>,
    pub property_updates: Vec<PropertyUpdate>,
    pub edges: Vec<EdgeRecord>,
    pub index_entries: Vec<(IndexKey, NodeId)>,
}

impl CommitRecord {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.property_updates.is_empty()
            && self.edges.is_empty()
            && self.index_entries.is_empty()
    }
}
