//! Binary snapshots of a network via `bitcode` with a versioned header.
//!
//! A snapshot carries the configuration, the phase scheduler, every node's
//! persisted state, and the network clock. Topology caches are never saved:
//! every loaded node starts dirty and rescans on its first tick. Endpoints
//! belong to the host and are registered again after loading.

use crate::config::{ConfigError, NetworkConfig};
use crate::grid::{GridError, Occupant};
use crate::id::NodeId;
use crate::network::Network;
use crate::node::Node;
use crate::scheduler::TickScheduler;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a conduit network snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xC04D_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("snapshot config is invalid: {0}")]
    Config(#[from] ConfigError),
    #[error("two nodes in the snapshot share a cell: {0}")]
    Overlap(#[from] GridError),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Network tick when the snapshot was taken.
    pub tick: u64,
}

impl SnapshotHeader {
    pub fn new(tick: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkSnapshot {
    header: SnapshotHeader,
    config: NetworkConfig,
    scheduler: TickScheduler,
    nodes: SlotMap<NodeId, Node>,
}

/// Decode just enough of a snapshot to report its header.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: NetworkSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

impl Network {
    /// Encode the network. Node ids survive a save/load round trip.
    pub fn save(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = NetworkSnapshot {
            header: SnapshotHeader::new(self.tick),
            config: self.config.clone(),
            scheduler: self.scheduler.clone(),
            nodes: self.nodes.clone(),
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Decode a network saved with [`save`](Self::save). The grid is rebuilt
    /// from node positions and every cache starts dirty.
    pub fn load(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: NetworkSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        snapshot.config.validate()?;

        let mut network = Network::with_valid_config(snapshot.config);
        for (id, node) in &snapshot.nodes {
            network.grid.place(node.position(), Occupant::Conduit(id))?;
        }
        network.nodes = snapshot.nodes;
        network.scheduler = snapshot.scheduler;
        network.tick = snapshot.header.tick;
        tracing::debug!(
            nodes = network.nodes.len(),
            tick = network.tick,
            "network restored from snapshot"
        );
        Ok(network)
    }
}
