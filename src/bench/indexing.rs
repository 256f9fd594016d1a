//! Write policies: how one synthetic node gets into the store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::graph::{NodeId, Transaction};
use crate::storage::PropertyValue;
use super::name_gen::NameGenerator;

/// Key every synthetic node is named (and uniquely indexed) under.
pub const NAME_KEY: &str = "name";

/// Label of the edge linking each synthetic node to the root.
pub const LIKES: &str = "LIKES";

pub const DEFAULT_INDEX_NAME: &str = "synthetic";

/// Node creation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indexing {
    /// Atomic get-or-create through a unique index on `name`.
    Unique,
    /// Unconditional creation, no index.
    #[serde(alias = "none")]
    Plain,
}

impl Indexing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Indexing::Unique => "UNIQUE",
            Indexing::Plain => "PLAIN",
        }
    }
}

impl fmt::Display for Indexing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Indexing {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unique" => Ok(Indexing::Unique),
            "plain" | "none" => Ok(Indexing::Plain),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown indexing '{}' (expected unique|plain)",
                other
            ))),
        }
    }
}

/// Properties written on each synthetic node besides `name`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePayload {
    /// `name` only.
    Minimal,
    /// `name` plus six random properties.
    #[default]
    Rich,
}

impl NodePayload {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodePayload::Minimal => "minimal",
            NodePayload::Rich => "rich",
        }
    }
}

impl FromStr for NodePayload {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(NodePayload::Minimal),
            "rich" => Ok(NodePayload::Rich),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown payload '{}' (expected minimal|rich)",
                other
            ))),
        }
    }
}

/// Random filler for rich nodes. Carries no meaning beyond its weight.
#[derive(Debug, Clone)]
struct RichPayload {
    activity_level: i64,
    rank: i64,
    group: String,
    status: String,
    points: i64,
    cash: i64,
}

impl RichPayload {
    fn draw(names: &NameGenerator) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            activity_level: rng.gen(),
            rank: rng.gen(),
            group: names.next_name(),
            status: names.next_name(),
            points: rng.gen(),
            cash: rng.gen(),
        }
    }

    fn write(&self, tx: &mut dyn Transaction, node: NodeId) -> Result<()> {
        tx.set_property(node, "activityLevel", PropertyValue::Long(self.activity_level))?;
        tx.set_property(node, "rank", PropertyValue::Long(self.rank))?;
        tx.set_property(node, "group", self.group.as_str().into())?;
        tx.set_property(node, "status", self.status.as_str().into())?;
        // points and cash are stored as decimal strings
        tx.set_property(node, "points", self.points.to_string().into())?;
        tx.set_property(node, "cash", self.cash.to_string().into())?;
        Ok(())
    }
}

/// Creates synthetic nodes for one run according to its `Indexing`.
///
/// Shared read-only by every job of the run.
#[derive(Debug, Clone)]
pub struct NodeFactory {
    indexing: Indexing,
    payload: NodePayload,
    index_name: String,
    names: Arc<NameGenerator>,
}

impl NodeFactory {
    pub fn new(
        indexing: Indexing,
        payload: NodePayload,
        index_name: impl Into<String>,
        names: Arc<NameGenerator>,
    ) -> Self {
        Self {
            indexing,
            payload,
            index_name: index_name.into(),
            names,
        }
    }

    /// Create a node named with a fresh generator name.
    pub fn create_next(&self, tx: &mut dyn Transaction) -> Result<NodeId> {
        let name = self.names.next_name();
        self.create(tx, &name)
    }

    /// Create (or, under `Unique`, find) the node named `name`.
    pub fn create(&self, tx: &mut dyn Transaction, name: &str) -> Result<NodeId> {
        match self.indexing {
            Indexing::Unique => self.get_or_create(tx, name),
            Indexing::Plain => self.create_plain(tx, name),
        }
    }

    fn draw_payload(&self) -> Option<RichPayload> {
        match self.payload {
            NodePayload::Minimal => None,
            NodePayload::Rich => Some(RichPayload::draw(&self.names)),
        }
    }

    /// The payload is drawn up front but only written when the node is new.
    fn get_or_create(&self, tx: &mut dyn Transaction, name: &str) -> Result<NodeId> {
        let payload = self.draw_payload();
        let mut initialize = |tx: &mut dyn Transaction, node: NodeId| -> Result<()> {
            tx.set_property(node, NAME_KEY, name.into())?;
            if let Some(payload) = &payload {
                payload.write(tx, node)?;
            }
            Ok(())
        };
        tx.get_or_create(&self.index_name, NAME_KEY, name, &mut initialize)
    }

    fn create_plain(&self, tx: &mut dyn Transaction, name: &str) -> Result<NodeId> {
        let node = tx.create_node()?;
        tx.set_property(node, NAME_KEY, name.into())?;
        if let Some(payload) = self.draw_payload() {
            payload.write(tx, node)?;
        }
        Ok(node)
    }
}
