//! Conduit Core -- a self-organizing resource distribution mesh.
//!
//! Conduit nodes sit in a 3D grid, discover the peers and host endpoints
//! around them, cache that topology, and once per tick push a bounded amount
//! of a fungible resource to the best adjacent target under per-face I/O
//! policies, priorities, and load balancing.
//!
//! # Tick Pipeline
//!
//! Each call to [`network::Network::step`] ticks every node once:
//!
//! 1. **Notify** -- Queued policy changes become dirty flags on the node and
//!    the neighbor it faces.
//! 2. **Account** -- Stats advance and the node decides whether it is idle.
//! 3. **Refresh** -- The coordinator rescans the topology cache when it is
//!    dirty, stale, or the node's staggered phase comes up.
//! 4. **Flow** -- Input faces pull from endpoints; one transfer is pushed to
//!    the selected output face and reconciled against what was accepted.
//! 5. **Maintain** -- Passive cleanup and deep maintenance on long,
//!    phase-staggered cadences.
//!
//! # Key Types
//!
//! - [`network::Network`] -- Context object owning nodes, grid, endpoints,
//!   scheduler, and event log.
//! - [`node::Node`] -- Buffer, I/O policy, topology cache, stats, and phase.
//! - [`coordinator::NetworkCoordinator`] -- Decides and performs rescans.
//! - [`transfer::TransferEngine`] -- Plans and settles per-tick transfers.
//! - [`selection::SelectionStrategy`] -- Priority/balance target choice.
//! - [`endpoint::Endpoint`] -- The interface host producers and consumers expose.
//! - [`serialize`] -- Versioned snapshots via bitcode.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod direction;
pub mod endpoint;
pub mod event;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod network;
pub mod node;
pub mod policy;
pub mod query;
pub mod scheduler;
pub mod selection;
pub mod serialize;
pub mod stats;
pub mod transfer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
