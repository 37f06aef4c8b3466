//! The network context: owns every node, the grid, host endpoints, the tick
//! scheduler, and the event log, and routes all cross-node calls.
//!
//! # Tick order
//!
//! Each call to [`Network::tick_node`] runs, for one node:
//!
//! 1. **Notify** -- drain the node's policy outbox into dirty flags on itself
//!    and its neighbors.
//! 2. **Account** -- advance the node's stats and decide whether it is idle.
//! 3. **Refresh** -- let the coordinator rescan the topology cache if needed.
//! 4. **Flow** -- pull from endpoints behind input faces, then push one bounded
//!    transfer to the best output face.
//! 5. **Maintain** -- passive cleanup and deep maintenance on their
//!    phase-staggered cadences.
//!
//! [`Network::step`] ticks every node in key order and then advances the
//! network clock.

use crate::buffer::{Action, BufferError, ResourceBuffer};
use crate::cache::{NeighborKey, TargetInfo, TopologyCache};
use crate::config::{ConfigError, NetworkConfig};
use crate::coordinator::{NeighborProbe, NetworkCoordinator, ScanKind};
use crate::direction::{DirMap, Direction, DirectionError, DirectionSet};
use crate::endpoint::Endpoint;
use crate::event::{EventLog, NetworkEvent};
use crate::fixed::{Ticks, Units};
use crate::grid::{Grid, GridError, GridPos, Neighbor, NeighborLookup, Occupant};
use crate::id::{EndpointId, NodeId};
use crate::node::{Node, NodeState};
use crate::policy::{IoPolicy, IoType, PolicyEvent};
use crate::scheduler::TickScheduler;
use crate::transfer::{FlowOutcome, TransferEngine};
use slotmap::SlotMap;

/// Errors from host calls into the network.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown endpoint {0:?}")]
    UnknownEndpoint(EndpointId),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Direction(#[from] DirectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A host endpoint and where it sits.
#[derive(Debug)]
pub struct EndpointSlot {
    pub position: GridPos,
    pub endpoint: Box<dyn Endpoint>,
}

/// What one node did during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub idle: bool,
    pub scan: ScanKind,
    /// Units pulled in from endpoints.
    pub pulled: Units,
    pub flow: FlowOutcome,
    /// Cache entries pruned by passive cleanup.
    pub pruned: usize,
    pub deep_maintenance: bool,
}

/// Aggregate of one [`Network::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    pub tick: Ticks,
    pub nodes_ticked: usize,
    pub idle: usize,
    pub scans: usize,
    pub moved: Units,
    pub pulled: Units,
    pub issues: usize,
}

#[derive(Debug)]
pub struct Network {
    pub(crate) config: NetworkConfig,
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) endpoints: SlotMap<EndpointId, EndpointSlot>,
    pub(crate) grid: Grid,
    pub(crate) scheduler: TickScheduler,
    coordinator: NetworkCoordinator,
    engine: TransferEngine,
    events: EventLog,
    pub(crate) tick: Ticks,
}

impl Default for Network {
    fn default() -> Self {
        Self::with_valid_config(NetworkConfig::default())
    }
}

impl Network {
    pub fn new(config: NetworkConfig) -> Result<Self, NetworkError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    pub(crate) fn with_valid_config(config: NetworkConfig) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            endpoints: SlotMap::with_key(),
            grid: Grid::new(),
            scheduler: TickScheduler::new(config.scan_interval),
            coordinator: NetworkCoordinator::new(config.scan_interval),
            engine: TransferEngine::from_config(&config),
            events: EventLog::new(config.event_capacity),
            tick: 0,
            config,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Current network tick.
    pub fn tick(&self) -> Ticks {
        self.tick
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Place an empty node with the given buffer capacity.
    pub fn add_node(&mut self, position: GridPos, capacity: Units) -> Result<NodeId, NetworkError> {
        self.add_node_with_buffer(position, ResourceBuffer::new(capacity))
    }

    pub fn add_node_with_buffer(
        &mut self,
        position: GridPos,
        buffer: ResourceBuffer,
    ) -> Result<NodeId, NetworkError> {
        self.add_node_with_policy(position, buffer, IoPolicy::new())
    }

    /// Place a node whose construction-time policy is `policy`.
    pub fn add_node_with_policy(
        &mut self,
        position: GridPos,
        buffer: ResourceBuffer,
        policy: IoPolicy,
    ) -> Result<NodeId, NetworkError> {
        if self.grid.is_occupied(position) {
            return Err(GridError::Occupied(position).into());
        }
        let phase = self.scheduler.assign();
        let mut node = Node::new(position, buffer, phase, self.config.stats_history_len);
        *node.policy_mut() = policy;
        let id = self.nodes.insert(node);
        self.grid.place(position, Occupant::Conduit(id))?;
        self.invalidate_around(position);
        tracing::debug!(?id, ?position, phase = phase.0, "node added");
        self.events.push(NetworkEvent::NodeAdded {
            node: id,
            position,
            tick: self.tick,
        });
        Ok(id)
    }

    /// Remove a node. Neighbors that cached it drop the entry on their next
    /// tick. Returns the node's persisted state.
    pub fn remove_node(&mut self, id: NodeId) -> Result<NodeState, NetworkError> {
        let node = self.nodes.remove(id).ok_or(NetworkError::UnknownNode(id))?;
        let position = node.position();
        self.grid.remove(position);
        self.invalidate_around(position);
        tracing::debug!(?id, ?position, "node removed");
        self.events.push(NetworkEvent::NodeRemoved {
            node: id,
            position,
            tick: self.tick,
        });
        Ok(node.persisted_state())
    }

    pub fn add_endpoint(
        &mut self,
        position: GridPos,
        endpoint: impl Endpoint + 'static,
    ) -> Result<EndpointId, NetworkError> {
        if self.grid.is_occupied(position) {
            return Err(GridError::Occupied(position).into());
        }
        let id = self.endpoints.insert(EndpointSlot {
            position,
            endpoint: Box::new(endpoint),
        });
        self.grid.place(position, Occupant::Endpoint(id))?;
        self.invalidate_around(position);
        self.events.push(NetworkEvent::EndpointAdded {
            endpoint: id,
            position,
            tick: self.tick,
        });
        Ok(id)
    }

    pub fn remove_endpoint(&mut self, id: EndpointId) -> Result<Box<dyn Endpoint>, NetworkError> {
        let slot = self.endpoints.remove(id).ok_or(NetworkError::UnknownEndpoint(id))?;
        self.grid.remove(slot.position);
        self.invalidate_around(slot.position);
        self.events.push(NetworkEvent::EndpointRemoved {
            endpoint: id,
            position: slot.position,
            tick: self.tick,
        });
        Ok(slot.endpoint)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Direct node access. Policy changes made through it are flushed at the
    /// start of the node's next tick.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn node_at(&self, position: GridPos) -> Option<NodeId> {
        match self.grid.occupant_at(position) {
            Some(Occupant::Conduit(id)) => Some(id),
            _ => None,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&dyn Endpoint> {
        self.endpoints.get(id).map(|slot| &*slot.endpoint)
    }

    pub fn endpoint_mut(&mut self, id: EndpointId) -> Option<&mut (dyn Endpoint + 'static)> {
        self.endpoints.get_mut(id).map(|slot| &mut *slot.endpoint)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    fn node_mut_or_err(&mut self, id: NodeId) -> Result<&mut Node, NetworkError> {
        self.nodes.get_mut(id).ok_or(NetworkError::UnknownNode(id))
    }

    fn node_or_err(&self, id: NodeId) -> Result<&Node, NetworkError> {
        self.nodes.get(id).ok_or(NetworkError::UnknownNode(id))
    }

    pub fn io_config(&self, id: NodeId, direction: Direction) -> Result<IoType, NetworkError> {
        Ok(self.node_or_err(id)?.policy().io_type(direction))
    }

    /// Change one face's I/O type. Returns whether anything changed.
    pub fn set_io_config(
        &mut self,
        id: NodeId,
        direction: Direction,
        io_type: IoType,
    ) -> Result<bool, NetworkError> {
        let changed = self.node_mut_or_err(id)?.policy_mut().set_type(direction, io_type);
        self.flush_notifications(id);
        Ok(changed)
    }

    pub fn io_map(&self, id: NodeId) -> Result<DirMap<IoType>, NetworkError> {
        Ok(self.node_or_err(id)?.policy().io_map())
    }

    /// Apply a whole I/O map. Returns how many faces changed.
    pub fn set_io_map(&mut self, id: NodeId, map: &DirMap<IoType>) -> Result<usize, NetworkError> {
        let changed = self.node_mut_or_err(id)?.policy_mut().set_io_map(map);
        self.flush_notifications(id);
        Ok(changed)
    }

    pub fn priority(&self, id: NodeId, direction: Direction) -> Result<i32, NetworkError> {
        Ok(self.node_or_err(id)?.policy().priority(direction))
    }

    pub fn set_priority(
        &mut self,
        id: NodeId,
        direction: Direction,
        priority: i32,
    ) -> Result<bool, NetworkError> {
        let changed = self.node_mut_or_err(id)?.policy_mut().set_priority(direction, priority);
        self.flush_notifications(id);
        Ok(changed)
    }

    /// Restore every face priority to its default. Returns how many changed.
    pub fn reset_all_priorities(&mut self, id: NodeId) -> Result<usize, NetworkError> {
        let changed = self.node_mut_or_err(id)?.policy_mut().reset_priorities();
        self.flush_notifications(id);
        Ok(changed)
    }

    /// Restore the whole policy (types and priorities) to its defaults.
    pub fn reset_policy(&mut self, id: NodeId) -> Result<usize, NetworkError> {
        let changed = self.node_mut_or_err(id)?.policy_mut().reset_all();
        self.flush_notifications(id);
        Ok(changed)
    }

    /// Force a full rescan of this node and of every face that faces it.
    pub fn mark_network_dirty(&mut self, id: NodeId) -> Result<(), NetworkError> {
        let node = self.node_mut_or_err(id)?;
        node.cache_mut().mark_dirty();
        let position = node.position();
        self.invalidate_around(position);
        Ok(())
    }

    /// Resize a node's buffer. Units above the new capacity are discarded and
    /// returned. Faces looking at the node rescan, since the headroom they
    /// cached no longer holds.
    pub fn set_capacity(&mut self, id: NodeId, capacity: Units) -> Result<Units, NetworkError> {
        let node = self.node_mut_or_err(id)?;
        let discarded = node.buffer_mut().set_capacity(capacity);
        let position = node.position();
        self.invalidate_around(position);
        Ok(discarded)
    }

    // -----------------------------------------------------------------------
    // Indicators and the exchange ABI
    // -----------------------------------------------------------------------

    pub fn active_connection_count(&self, id: NodeId) -> Result<usize, NetworkError> {
        Ok(self.node_or_err(id)?.active_connection_count())
    }

    /// Whether `direction` pushed something within the active window.
    pub fn is_transferring(&self, id: NodeId, direction: Direction) -> Result<bool, NetworkError> {
        Ok(self
            .node_or_err(id)?
            .is_transferring(direction, self.tick, self.config.active_window))
    }

    /// Offer resource to a node as if it arrived through face `from`.
    pub fn insert_into(
        &mut self,
        id: NodeId,
        amount: Units,
        action: Action,
        from: Direction,
    ) -> Result<Units, NetworkError> {
        let now = self.tick;
        Ok(self.node_mut_or_err(id)?.receive(amount, action, from, now)?)
    }

    /// Take resource straight out of a node's buffer.
    pub fn extract_from(
        &mut self,
        id: NodeId,
        amount: Units,
        action: Action,
    ) -> Result<Units, NetworkError> {
        Ok(self.node_mut_or_err(id)?.buffer_mut().extract(amount, action)?)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    pub fn drain_events(&mut self) -> Vec<NetworkEvent> {
        self.events.drain()
    }

    // -----------------------------------------------------------------------
    // Notification
    // -----------------------------------------------------------------------

    /// Mark the face of every adjacent conduit that looks at `position`.
    fn invalidate_around(&mut self, position: GridPos) {
        let adjacent: Vec<(Direction, NodeId)> = self.grid.adjacent_conduits(position).collect();
        for (direction, neighbor) in adjacent {
            if let Some(node) = self.nodes.get_mut(neighbor) {
                node.cache_mut().mark_direction_dirty(direction.opposite());
            }
        }
    }

    /// Mark the face of the peer behind `direction` that looks back at us.
    fn notify_neighbor(&mut self, position: GridPos, direction: Direction) {
        if let Neighbor::Peer(peer) = self.grid.neighbor(position, direction)
            && let Some(node) = self.nodes.get_mut(peer)
        {
            node.cache_mut().mark_direction_dirty(direction.opposite());
        }
    }

    /// Turn queued policy events into dirty flags and log entries. Never
    /// moves resource.
    fn flush_notifications(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if !node.policy().has_pending_events() {
            return;
        }
        let position = node.position();
        let pending = node.policy_mut().drain_events();
        let tick = self.tick;
        for event in pending {
            match event {
                PolicyEvent::IoConfigChanged { direction, io_type } => {
                    if let Some(node) = self.nodes.get_mut(id) {
                        node.cache_mut().mark_dirty();
                    }
                    self.notify_neighbor(position, direction);
                    self.events.push(NetworkEvent::IoConfigChanged {
                        node: id,
                        direction,
                        io_type,
                        tick,
                    });
                }
                PolicyEvent::PriorityChanged { direction, priority } => {
                    self.notify_neighbor(position, direction);
                    self.events.push(NetworkEvent::PriorityChanged {
                        node: id,
                        direction,
                        priority,
                        tick,
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Run one tick of one node at the current network tick.
    pub fn tick_node(&mut self, id: NodeId) -> Result<TickReport, NetworkError> {
        if !self.nodes.contains_key(id) {
            return Err(NetworkError::UnknownNode(id));
        }
        let now = self.tick;
        self.flush_notifications(id);

        let idle = match self.nodes.get_mut(id) {
            Some(node) => {
                node.stats_mut().begin_tick();
                node.is_idle(now, self.config.idle_window)
            }
            None => return Err(NetworkError::UnknownNode(id)),
        };

        let mut report = TickReport {
            idle,
            scan: self.refresh_topology(id, now, idle),
            ..TickReport::default()
        };

        if !idle {
            report.pulled = self.pull_from_endpoints(id, now);
            report.flow = self.process_flow(id, now);
            self.track_output(id, &report.flow);
        }

        let (pruned, deep) = self.maintain(id, now);
        report.pruned = pruned;
        report.deep_maintenance = deep;
        Ok(report)
    }

    /// Tick every node once, in key order, then advance the clock.
    pub fn step(&mut self) -> StepReport {
        let ids: Vec<NodeId> = self.nodes.keys().collect();
        let mut summary = StepReport {
            tick: self.tick,
            ..StepReport::default()
        };
        for id in ids {
            let Ok(report) = self.tick_node(id) else {
                continue;
            };
            summary.nodes_ticked += 1;
            summary.idle += usize::from(report.idle);
            summary.scans += usize::from(report.scan.is_scan());
            summary.moved += report.flow.moved;
            summary.pulled += report.pulled;
            summary.issues += usize::from(report.flow.issue.is_some());
        }
        self.advance_tick();
        summary
    }

    /// Advance the clock without ticking nodes. Hosts that drive nodes with
    /// [`tick_node`](Self::tick_node) call this once per simulation step.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    fn probe_for(&self, node: &Node) -> MeshProbe<'_> {
        MeshProbe {
            origin: node.position(),
            grid: &self.grid,
            nodes: &self.nodes,
            endpoints: &self.endpoints,
        }
    }

    fn refresh_topology(&mut self, id: NodeId, now: Ticks, idle: bool) -> ScanKind {
        let Some(node) = self.nodes.get_mut(id) else {
            return ScanKind::Skip;
        };
        let mut cache = std::mem::take(node.cache_mut());

        let Some(node) = self.nodes.get(id) else {
            return ScanKind::Skip;
        };
        let before = connected_faces(&cache, node.policy());
        let probe = self.probe_for(node);
        let kind = self
            .coordinator
            .update_if_needed(&mut cache, node.policy(), node.phase(), &probe, now, idle);
        let after = connected_faces(&cache, node.policy());
        let connections = after.len();

        if let Some(node) = self.nodes.get_mut(id) {
            *node.cache_mut() = cache;
        }
        if kind.is_scan() {
            tracing::trace!(?id, ?kind, now, "topology rescanned");
        }
        if before != after {
            tracing::debug!(?id, connections, "adjacency changed");
            self.events.push(NetworkEvent::AdjacencyChanged {
                node: id,
                connections,
                tick: now,
            });
        }
        kind
    }

    fn pull_from_endpoints(&mut self, id: NodeId, now: Ticks) -> Units {
        let Some(node) = self.nodes.get(id) else {
            return 0;
        };
        let plans = self.engine.pull_plans(node, now);
        let mut pulled = 0;
        for plan in plans {
            let Some(slot) = self.endpoints.get_mut(plan.endpoint) else {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.cache_mut().mark_direction_dirty(plan.direction);
                }
                continue;
            };
            let taken = slot.endpoint.extract(plan.amount, Action::Execute).clamp(0, plan.amount);
            if taken == 0 {
                continue;
            }
            let accepted = match self.nodes.get_mut(id) {
                Some(node) => node
                    .receive(taken, Action::Execute, plan.direction, now)
                    .unwrap_or(0),
                None => 0,
            };
            if accepted < taken {
                slot.endpoint.insert(taken - accepted, Action::Execute);
            }
            pulled += accepted;
        }
        pulled
    }

    fn process_flow(&mut self, id: NodeId, now: Ticks) -> FlowOutcome {
        let Some(node) = self.nodes.get(id) else {
            return FlowOutcome::default();
        };
        let Some(plan) = self.engine.plan(node, now) else {
            return FlowOutcome::default();
        };
        let debited = match self.nodes.get_mut(id) {
            Some(node) => node.buffer_mut().extract(plan.amount, Action::Execute).unwrap_or(0),
            None => 0,
        };
        if debited == 0 {
            return FlowOutcome::default();
        }

        let accepted = self.deliver(plan.target, plan.direction, debited, now);
        let Some(node) = self.nodes.get_mut(id) else {
            return FlowOutcome::default();
        };
        let outcome = self.engine.settle(node, &plan, debited, accepted, now);

        if let Some(issue) = outcome.issue {
            tracing::debug!(?id, direction = ?plan.direction, ?issue, "transfer recovered");
            self.events.push(NetworkEvent::FlowIssue {
                node: id,
                direction: plan.direction,
                issue,
                tick: now,
            });
        }
        outcome
    }

    /// Offer `amount` to the target behind `direction`. `None` if the target
    /// no longer exists.
    fn deliver(
        &mut self,
        target: NeighborKey,
        direction: Direction,
        amount: Units,
        now: Ticks,
    ) -> Option<Units> {
        match target {
            NeighborKey::Peer(peer) => {
                let node = self.nodes.get_mut(peer)?;
                Some(
                    node.receive(amount, Action::Execute, direction.opposite(), now)
                        .unwrap_or(0),
                )
            }
            NeighborKey::Endpoint(endpoint) => {
                let slot = self.endpoints.get_mut(endpoint)?;
                Some(slot.endpoint.insert(amount, Action::Execute))
            }
        }
    }

    /// Count ticks where a loaded node had somewhere to push but moved nothing.
    fn track_output(&mut self, id: NodeId, flow: &FlowOutcome) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let has_outlet = node
            .cache()
            .entries()
            .any(|(d, _)| node.policy().io_type(d).can_output());
        if flow.moved > 0 || node.buffer().is_empty() || !has_outlet {
            node.stats_mut().clear_output_failure();
        } else {
            node.stats_mut().note_output_failure();
        }
    }

    fn maintain(&mut self, id: NodeId, now: Ticks) -> (usize, bool) {
        let Some(node) = self.nodes.get(id) else {
            return (0, false);
        };
        let phase = node.phase();
        let mut pruned = 0;

        if self.scheduler.is_due(phase, now, self.config.passive_cleanup_interval) {
            let Some(node) = self.nodes.get_mut(id) else {
                return (0, false);
            };
            let mut cache = std::mem::take(node.cache_mut());
            if let Some(node) = self.nodes.get(id) {
                let probe = self.probe_for(node);
                pruned = self.coordinator.passive_cleanup(&mut cache, &probe);
            }
            if let Some(node) = self.nodes.get_mut(id) {
                *node.cache_mut() = cache;
                let trimmed = node.stats_mut().trim(now, self.config.stats_retention);
                tracing::trace!(?id, pruned, trimmed, "passive cleanup");
            }
        }

        let deep = self.scheduler.is_due(phase, now, self.config.deep_maintenance_interval);
        if deep && let Some(node) = self.nodes.get_mut(id) {
            if node.cache().last_full_scan() != Some(now) {
                node.cache_mut().mark_dirty();
            }
            let failures = node.stats().output_failures();
            if failures >= self.config.output_failure_threshold
                && node.stats_mut().mark_failure_reported()
            {
                let position = node.position();
                tracing::warn!(?id, failures, ?position, "persistent output failure");
                self.events.push(NetworkEvent::OutputStalled {
                    node: id,
                    ticks: failures,
                    tick: now,
                });
            }
        }
        (pruned, deep)
    }

    /// Drop every cached neighbor. Each node rescans on its next tick.
    pub fn clear_caches(&mut self) {
        for node in self.nodes.values_mut() {
            node.cache_mut().clear();
        }
    }

    /// Units held across all nodes.
    pub fn total_stored(&self) -> Units {
        self.nodes.values().map(|n| n.buffer().stored()).sum()
    }
}

/// Faces with a cached neighbor on an enabled side.
fn connected_faces(cache: &TopologyCache, policy: &IoPolicy) -> DirectionSet {
    cache
        .entries()
        .filter(|(d, _)| policy.io_type(*d).is_enabled())
        .map(|(d, _)| d)
        .collect()
}

/// Reads a node's surroundings out of the network for the coordinator.
struct MeshProbe<'a> {
    origin: GridPos,
    grid: &'a Grid,
    nodes: &'a SlotMap<NodeId, Node>,
    endpoints: &'a SlotMap<EndpointId, EndpointSlot>,
}

impl NeighborProbe for MeshProbe<'_> {
    fn probe(&self, direction: Direction, now: Ticks) -> Option<TargetInfo> {
        match self.grid.neighbor(self.origin, direction) {
            Neighbor::None => None,
            Neighbor::Peer(id) => {
                let peer = self.nodes.get(id)?;
                let side = peer.policy().side(direction.opposite());
                if !side.io.is_enabled() {
                    return None;
                }
                let available = if side.io.can_input() {
                    peer.buffer().free()
                } else {
                    0
                };
                Some(TargetInfo {
                    key: NeighborKey::Peer(id),
                    stored: peer.buffer().stored(),
                    available,
                    priority: side.priority,
                    refreshed_at: now,
                })
            }
            Neighbor::Endpoint(id) => {
                let slot = self.endpoints.get(id)?;
                Some(TargetInfo {
                    key: NeighborKey::Endpoint(id),
                    stored: slot.endpoint.stored(),
                    available: slot.endpoint.available(),
                    priority: slot.endpoint.priority(),
                    refreshed_at: now,
                })
            }
        }
    }

    fn still_present(&self, direction: Direction, key: NeighborKey) -> bool {
        match (self.grid.neighbor(self.origin, direction), key) {
            (Neighbor::Peer(found), NeighborKey::Peer(cached)) => {
                found == cached && self.nodes.contains_key(found)
            }
            (Neighbor::Endpoint(found), NeighborKey::Endpoint(cached)) => {
                found == cached && self.endpoints.contains_key(found)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::BufferEndpoint;

    fn config(rate: Units) -> NetworkConfig {
        NetworkConfig {
            transfer_rate: rate,
            ..NetworkConfig::default()
        }
    }

    fn net(rate: Units) -> Network {
        Network::new(config(rate)).unwrap()
    }

    fn pos(x: i32) -> GridPos {
        GridPos::new(x, 0, 0)
    }

    fn stored(net: &Network, id: NodeId) -> Units {
        net.node(id).unwrap().buffer().stored()
    }

    #[test]
    fn one_step_moves_one_rate_worth() {
        let mut net = net(10);
        let a = net.add_node_with_buffer(pos(0), ResourceBuffer::with_stored(100, 100)).unwrap();
        let b = net.add_node(pos(1), 100).unwrap();

        let report = net.step();
        assert_eq!(stored(&net, a), 90);
        assert_eq!(stored(&net, b), 10);
        assert_eq!(report.moved, 10);
        assert!(net.is_transferring(a, Direction::East).unwrap());
        assert!(!net.is_transferring(b, Direction::West).unwrap());
    }

    #[test]
    fn occupied_cell_rejected() {
        let mut net = net(10);
        net.add_node(pos(0), 100).unwrap();
        let err = net.add_node(pos(0), 100).unwrap_err();
        assert!(matches!(err, NetworkError::Grid(GridError::Occupied(_))));
        assert_eq!(net.node_count(), 1);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let mut net = net(10);
        let a = net.add_node(pos(0), 100).unwrap();
        net.remove_node(a).unwrap();
        assert!(matches!(net.tick_node(a), Err(NetworkError::UnknownNode(_))));
        assert!(matches!(net.io_config(a, Direction::Up), Err(NetworkError::UnknownNode(_))));
    }

    #[test]
    fn disabling_a_face_hides_the_node_from_its_neighbor() {
        let mut net = net(10);
        let a = net.add_node(pos(0), 100).unwrap();
        let b = net.add_node(pos(1), 100).unwrap();
        net.step();
        assert!(net.node(b).unwrap().cache().entry(Direction::West).is_some());

        assert!(net.set_io_config(a, Direction::East, IoType::Disabled).unwrap());
        assert!(net.node(b).unwrap().cache().dirty_directions().contains(Direction::West));
        net.tick_node(b).unwrap();
        assert!(net.node(b).unwrap().cache().entry(Direction::West).is_none());
        assert_eq!(net.active_connection_count(b).unwrap(), 0);
    }

    #[test]
    fn same_setting_twice_queues_one_event() {
        let mut net = net(10);
        let a = net.add_node(pos(0), 100).unwrap();
        net.drain_events();
        assert!(net.set_io_config(a, Direction::Up, IoType::Output).unwrap());
        assert!(!net.set_io_config(a, Direction::Up, IoType::Output).unwrap());
        let events = net.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NetworkEvent::IoConfigChanged { io_type: IoType::Output, .. }));
    }

    #[test]
    fn face_priority_steers_flow() {
        let mut net = net(10);
        let a = net.add_node_with_buffer(pos(0), ResourceBuffer::with_stored(100, 100)).unwrap();
        let east = net.add_node(pos(1), 100).unwrap();
        let west = net.add_node(pos(-1), 100).unwrap();
        net.set_priority(a, Direction::East, 10).unwrap();

        net.tick_node(a).unwrap();
        assert_eq!(stored(&net, east), 10);
        assert_eq!(stored(&net, west), 0);
    }

    #[test]
    fn removed_neighbor_is_handled_without_moving() {
        let mut net = net(10);
        let a = net.add_node_with_buffer(pos(0), ResourceBuffer::with_stored(100, 100)).unwrap();
        let b = net.add_node(pos(1), 100).unwrap();
        net.step();
        net.remove_node(b).unwrap();

        let report = net.tick_node(a).unwrap();
        assert_eq!(report.flow.moved, 0);
        assert!(net.node(a).unwrap().cache().entry(Direction::East).is_none());
        assert_eq!(stored(&net, a), 90);
    }

    #[test]
    fn vanished_target_recredits() {
        let mut net = net(10);
        let a = net.add_node_with_buffer(pos(0), ResourceBuffer::with_stored(100, 100)).unwrap();
        let b = net.add_node(pos(1), 100).unwrap();
        net.step();

        // Remove behind the network's back so the cache keeps the old key.
        net.nodes.remove(b);
        let report = net.tick_node(a).unwrap();
        assert_eq!(report.flow.issue, Some(crate::transfer::FlowIssue::StaleReference));
        assert_eq!(report.flow.moved, 0);
        assert_eq!(stored(&net, a), 90);
    }

    #[test]
    fn pushes_into_endpoint() {
        let mut net = net(25);
        let a = net.add_node_with_buffer(pos(0), ResourceBuffer::with_stored(100, 100)).unwrap();
        let sink = net.add_endpoint(pos(1), BufferEndpoint::new(1000)).unwrap();
        net.step();
        assert_eq!(net.endpoint(sink).unwrap().stored(), 25);
        assert_eq!(stored(&net, a), 75);
    }

    #[test]
    fn input_face_pulls_from_endpoint() {
        let mut net = net(25);
        let a = net.add_node(pos(0), 100).unwrap();
        let source = net.add_endpoint(pos(-1), BufferEndpoint::with_stored(1000, 1000)).unwrap();
        net.set_io_config(a, Direction::West, IoType::Input).unwrap();

        let report = net.step();
        assert_eq!(report.pulled, 25);
        assert_eq!(net.endpoint(source).unwrap().stored(), 975);
        assert_eq!(stored(&net, a), 25);
    }

    #[test]
    fn both_face_never_pulls() {
        let mut net = net(25);
        let a = net.add_node(pos(0), 100).unwrap();
        net.add_endpoint(pos(-1), BufferEndpoint::with_stored(1000, 1000)).unwrap();
        net.step();
        assert_eq!(stored(&net, a), 0);
    }

    #[test]
    fn insert_into_respects_face() {
        let mut net = net(10);
        let a = net.add_node(pos(0), 100).unwrap();
        net.set_io_config(a, Direction::Up, IoType::Output).unwrap();
        assert_eq!(net.insert_into(a, 50, Action::Execute, Direction::Up).unwrap(), 0);
        assert_eq!(net.insert_into(a, 150, Action::Execute, Direction::Down).unwrap(), 100);
        assert!(matches!(
            net.insert_into(a, -5, Action::Execute, Direction::Down),
            Err(NetworkError::Buffer(BufferError::NegativeAmount(-5)))
        ));
        assert_eq!(net.extract_from(a, 30, Action::Simulate).unwrap(), 30);
        assert_eq!(net.extract_from(a, 30, Action::Execute).unwrap(), 30);
        assert_eq!(stored(&net, a), 70);
    }

    #[test]
    fn adjacency_change_is_logged() {
        let mut net = net(10);
        let a = net.add_node(pos(0), 100).unwrap();
        net.add_node(pos(1), 100).unwrap();
        net.drain_events();
        net.tick_node(a).unwrap();
        let events = net.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            NetworkEvent::AdjacencyChanged { node, connections: 1, .. } if *node == a
        )));
    }

    #[test]
    fn stuck_output_reported_once() {
        let mut net = Network::new(NetworkConfig {
            transfer_rate: 10,
            output_failure_threshold: 3,
            passive_cleanup_interval: 5,
            deep_maintenance_interval: 5,
            ..NetworkConfig::default()
        })
        .unwrap();
        let a = net.add_node_with_buffer(pos(0), ResourceBuffer::with_stored(100, 100)).unwrap();
        let b = net.add_node_with_buffer(pos(1), ResourceBuffer::with_stored(100, 100)).unwrap();
        net.set_io_config(b, Direction::East, IoType::Disabled).unwrap();
        net.drain_events();

        for _ in 0..20 {
            net.step();
        }
        let stalls: Vec<_> = net
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, NetworkEvent::OutputStalled { node, .. } if *node == a))
            .collect();
        assert_eq!(stalls.len(), 1);
    }

    #[test]
    fn shrinking_capacity_refreshes_neighbors() {
        let mut net = net(10);
        let a = net.add_node_with_buffer(pos(0), ResourceBuffer::with_stored(100, 100)).unwrap();
        let b = net.add_node_with_buffer(pos(1), ResourceBuffer::with_stored(100, 30)).unwrap();
        net.step();
        assert_eq!(stored(&net, b), 40);

        assert_eq!(net.set_capacity(b, 25).unwrap(), 15);
        assert_eq!(stored(&net, b), 25);
        assert!(net.node(a).unwrap().cache().dirty_directions().contains(Direction::East));

        let report = net.tick_node(a).unwrap();
        assert_eq!(report.flow.moved, 0);
        assert_eq!(stored(&net, a), 90);
    }

    #[test]
    fn deep_maintenance_follows_scaled_phase() {
        let mut net = net(10);
        net.add_node(pos(0), 100).unwrap();
        let b = net.add_node(pos(5), 100).unwrap();
        let mut deep = Vec::new();
        for _ in 0..1300 {
            let now = net.tick();
            if net.tick_node(b).unwrap().deep_maintenance {
                deep.push(now);
            }
            net.advance_tick();
        }
        assert_eq!(deep, vec![60, 1260]);
    }

    #[test]
    fn nodes_at_coordinate_edges_do_not_trade() {
        let mut net = net(10);
        let edge = GridPos::new(i32::MAX, 0, 0);
        let a = net.add_node_with_buffer(edge, ResourceBuffer::with_stored(100, 100)).unwrap();
        let b = net.add_node(GridPos::new(i32::MIN, 0, 0), 100).unwrap();
        net.step();
        assert_eq!(stored(&net, a), 100);
        assert_eq!(stored(&net, b), 0);
        assert_eq!(net.active_connection_count(a).unwrap(), 0);
    }

    #[test]
    fn clear_caches_forces_rescan() {
        let mut net = net(10);
        let a = net.add_node(pos(0), 100).unwrap();
        net.add_node(pos(1), 100).unwrap();
        net.step();
        net.clear_caches();
        assert!(net.node(a).unwrap().cache().is_dirty());
        assert_eq!(net.active_connection_count(a).unwrap(), 0);
        net.step();
        assert_eq!(net.active_connection_count(a).unwrap(), 1);
    }

    #[test]
    fn invalid_config_rejected() {
        let err = Network::new(NetworkConfig {
            scan_interval: 0,
            ..NetworkConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, NetworkError::Config(ConfigError::NonPositive { .. })));
    }

    #[test]
    fn raw_direction_errors_convert() {
        let err: NetworkError = Direction::try_from(9u8).unwrap_err().into();
        assert!(matches!(err, NetworkError::Direction(DirectionError::Unknown(9))));
    }
}
