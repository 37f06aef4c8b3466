//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::buffer::ResourceBuffer;
use crate::config::NetworkConfig;
use crate::fixed::Units;
use crate::grid::GridPos;
use crate::id::NodeId;
use crate::network::Network;

// ===========================================================================
// Positions
// ===========================================================================

pub fn pos(x: i32, y: i32, z: i32) -> GridPos {
    GridPos::new(x, y, z)
}

/// Position `x` cells east of the origin.
pub fn east(x: i32) -> GridPos {
    GridPos::new(x, 0, 0)
}

// ===========================================================================
// Configs
// ===========================================================================

pub fn config_with_rate(rate: Units) -> NetworkConfig {
    NetworkConfig {
        transfer_rate: rate,
        ..NetworkConfig::default()
    }
}

pub fn network_with_rate(rate: Units) -> Network {
    Network::new(config_with_rate(rate)).expect("valid test config")
}

// ===========================================================================
// Layouts
// ===========================================================================

/// Add a node holding `stored` of `capacity`.
pub fn add_filled(net: &mut Network, position: GridPos, capacity: Units, stored: Units) -> NodeId {
    net.add_node_with_buffer(position, ResourceBuffer::with_stored(capacity, stored))
        .expect("free cell")
}

/// A straight east-running line of nodes starting at the origin, each with
/// the given capacity and stored amount.
pub fn line(net: &mut Network, fills: &[(Units, Units)]) -> Vec<NodeId> {
    fills
        .iter()
        .enumerate()
        .map(|(i, &(capacity, stored))| add_filled(net, east(i as i32), capacity, stored))
        .collect()
}

/// A `side` x `side` x `side` cube of empty nodes.
pub fn cube(net: &mut Network, side: i32, capacity: Units) -> Vec<NodeId> {
    let mut ids = Vec::with_capacity((side * side * side).max(0) as usize);
    for x in 0..side {
        for y in 0..side {
            for z in 0..side {
                ids.push(net.add_node(pos(x, y, z), capacity).expect("free cell"));
            }
        }
    }
    ids
}

// ===========================================================================
// Assertions
// ===========================================================================

pub fn stored(net: &Network, id: NodeId) -> Units {
    net.node(id).map(|n| n.buffer().stored()).unwrap_or(0)
}

pub fn total_units(net: &Network) -> Units {
    net.total_stored()
}

pub fn run(net: &mut Network, steps: usize) {
    for _ in 0..steps {
        net.step();
    }
}
