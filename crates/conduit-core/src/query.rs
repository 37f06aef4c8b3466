//! Read-only views of network state for UI and diagnostics.
//!
//! All types are owned copies, with no references into network storage.

use crate::direction::{DirMap, Direction};
use crate::fixed::{Fixed64, Ticks, Units};
use crate::grid::GridPos;
use crate::id::NodeId;
use crate::network::Network;
use crate::policy::IoType;
use crate::scheduler::TickPhase;

/// An aggregated view of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub id: NodeId,
    pub position: GridPos,
    pub stored: Units,
    pub capacity: Units,
    /// Fill level as a 0..1 fraction.
    pub fill: Fixed64,
    pub io: DirMap<IoType>,
    /// Faces with a cached neighbor on an enabled side.
    pub connections: usize,
    /// Faces that pushed within the active window.
    pub transferring: DirMap<bool>,
    pub phase: TickPhase,
    /// Ticks this node has run.
    pub ticks: u64,
    pub idle: bool,
    pub total_sent: Units,
    pub last_full_scan: Option<Ticks>,
}

impl Network {
    pub fn summary(&self, id: NodeId) -> Option<NodeSummary> {
        let node = self.node(id)?;
        let now = self.tick();
        let config = self.config();
        Some(NodeSummary {
            id,
            position: node.position(),
            stored: node.buffer().stored(),
            capacity: node.buffer().capacity(),
            fill: node.buffer().fill_ratio(),
            io: node.policy().io_map(),
            connections: node.active_connection_count(),
            transferring: DirMap::from_fn(|d| node.is_transferring(d, now, config.active_window)),
            phase: node.phase(),
            ticks: node.stats().ticks(),
            idle: node.is_idle(now, config.idle_window),
            total_sent: node.stats().total_sent(),
            last_full_scan: node.cache().last_full_scan(),
        })
    }

    /// Summaries of every node, in key order.
    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.nodes().filter_map(|(id, _)| self.summary(id)).collect()
    }

    /// Faces of `id` currently pushing, in direction order.
    pub fn transferring_faces(&self, id: NodeId) -> Vec<Direction> {
        self.summary(id)
            .map(|s| s.transferring.iter().filter(|(_, on)| **on).map(|(d, _)| d).collect())
            .unwrap_or_default()
    }
}
