//! Node table
//!
//! A derived view of the nodes governance has referenced. Nodes join as
//! `Pending`; only enacted proposals trust or retire them.

use consortium_core::{ConsortiumError, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Joined, awaiting trust
    Pending,
    /// Trusted to participate
    Trusted,
    /// Removed; terminal
    Retired,
}

/// Status of every known node
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    nodes: BTreeMap<NodeId, NodeStatus>,
}

impl NodeTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a joining node as `Pending`
    pub fn add_pending(&mut self, node: NodeId) -> Result<()> {
        if self.nodes.contains_key(&node) {
            return Err(ConsortiumError::invalid(format!("{node} already joined")));
        }
        self.nodes.insert(node, NodeStatus::Pending);
        Ok(())
    }

    /// Current status of `node`
    pub fn status(&self, node: &NodeId) -> Option<NodeStatus> {
        self.nodes.get(node).copied()
    }

    /// Check that `node` can be trusted
    pub fn check_trust(&self, node: &NodeId) -> Result<()> {
        match self.nodes.get(node) {
            None => Err(ConsortiumError::not_found(format!("{node} does not exist"))),
            Some(NodeStatus::Retired) => Err(ConsortiumError::state_conflict(format!(
                "{node} is retired"
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Check that `node` can be retired
    pub fn check_retire(&self, node: &NodeId) -> Result<()> {
        self.check_trust(node)
    }

    pub(crate) fn set(&mut self, node: NodeId, status: NodeStatus) {
        self.nodes.insert(node, status);
    }

    /// Nodes in `status`
    pub fn with_status(&self, status: NodeStatus) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(move |(_, s)| **s == status)
            .map(|(id, _)| *id)
    }
}
