//! A conduit node: the aggregate of buffer, I/O policy, topology cache,
//! statistics, and tick phase.
//!
//! Nodes never reach across to their neighbors themselves. The owning
//! [`Network`](crate::network::Network) resolves neighbors, drains the
//! policy outbox, and moves resource between nodes.

use crate::buffer::{Action, BufferError, ResourceBuffer};
use crate::cache::TopologyCache;
use crate::direction::Direction;
use crate::fixed::{Ticks, Units};
use crate::grid::GridPos;
use crate::policy::IoPolicy;
use crate::scheduler::TickPhase;
use crate::stats::StatsTracker;
use serde::{Deserialize, Serialize};

/// A conduit node.
///
/// The topology cache is not serialized: a deserialized node always starts
/// with a dirty cache and rescans on its first tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    position: GridPos,
    buffer: ResourceBuffer,
    policy: IoPolicy,
    #[serde(skip)]
    cache: TopologyCache,
    stats: StatsTracker,
    phase: TickPhase,
}

/// The persisted portion of a node, handed to the host at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub position: GridPos,
    pub buffer: ResourceBuffer,
    pub policy: IoPolicy,
    pub stats: StatsTracker,
    pub phase: TickPhase,
}

impl Node {
    pub fn new(
        position: GridPos,
        buffer: ResourceBuffer,
        phase: TickPhase,
        history_len: usize,
    ) -> Self {
        Self {
            position,
            buffer,
            policy: IoPolicy::new(),
            cache: TopologyCache::new(),
            stats: StatsTracker::new(history_len),
            phase,
        }
    }

    /// Rebuild a node from persisted state. The cache starts dirty.
    pub fn restore(state: NodeState) -> Self {
        Self {
            position: state.position,
            buffer: state.buffer,
            policy: state.policy,
            cache: TopologyCache::new(),
            stats: state.stats,
            phase: state.phase,
        }
    }

    pub fn persisted_state(&self) -> NodeState {
        NodeState {
            position: self.position,
            buffer: self.buffer.clone(),
            policy: self.policy.clone(),
            stats: self.stats.clone(),
            phase: self.phase,
        }
    }

    pub fn position(&self) -> GridPos {
        self.position
    }

    pub fn buffer(&self) -> &ResourceBuffer {
        &self.buffer
    }

    pub fn policy(&self) -> &IoPolicy {
        &self.policy
    }

    /// Direct policy access. Queued change events are flushed by the network
    /// at the start of this node's next tick.
    pub fn policy_mut(&mut self) -> &mut IoPolicy {
        &mut self.policy
    }

    pub fn cache(&self) -> &TopologyCache {
        &self.cache
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut ResourceBuffer {
        &mut self.buffer
    }

    pub(crate) fn cache_mut(&mut self) -> &mut TopologyCache {
        &mut self.cache
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StatsTracker {
        &mut self.stats
    }

    /// Accept resource arriving through face `from`. Faces that do not take
    /// input accept nothing.
    pub fn receive(
        &mut self,
        amount: Units,
        action: Action,
        from: Direction,
        now: Ticks,
    ) -> Result<Units, BufferError> {
        if amount < 0 {
            return Err(BufferError::NegativeAmount(amount));
        }
        if !self.policy.io_type(from).can_input() {
            return Ok(0);
        }
        let accepted = self.buffer.insert(amount, action)?;
        if action.is_execute() && accepted > 0 {
            self.stats.record_received(from, now);
        }
        Ok(accepted)
    }

    /// Idle nodes hold nothing, have not moved anything within `window`
    /// ticks, and have no input-only face that pulls from endpoints.
    pub fn is_idle(&self, now: Ticks, window: Ticks) -> bool {
        !self.policy.has_input_side() && self.stats.is_idle(now, window, self.buffer.is_empty())
    }

    /// Faces with a cached neighbor on an enabled side.
    pub fn active_connection_count(&self) -> usize {
        self.cache.connection_count(&self.policy.io_map())
    }

    pub fn is_transferring(&self, direction: Direction, now: Ticks, window: Ticks) -> bool {
        self.stats.is_transferring(direction, now, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::IoType;

    fn node(capacity: Units, stored: Units) -> Node {
        Node::new(
            GridPos::new(0, 0, 0),
            ResourceBuffer::with_stored(capacity, stored),
            TickPhase(0),
            8,
        )
    }

    #[test]
    fn receive_respects_face_policy() {
        let mut n = node(100, 0);
        n.policy_mut().set_type(Direction::Up, IoType::Output);
        assert_eq!(n.receive(10, Action::Execute, Direction::Up, 0), Ok(0));
        assert_eq!(n.receive(10, Action::Execute, Direction::Down, 0), Ok(10));
        assert_eq!(n.buffer().stored(), 10);
        assert!(n.stats().received_during(Direction::Down, 0));
    }

    #[test]
    fn simulated_receive_records_nothing() {
        let mut n = node(100, 0);
        assert_eq!(n.receive(30, Action::Simulate, Direction::Down, 4), Ok(30));
        assert_eq!(n.buffer().stored(), 0);
        assert!(!n.stats().received_during(Direction::Down, 4));
    }

    #[test]
    fn negative_receive_rejected() {
        let mut n = node(100, 0);
        assert_eq!(
            n.receive(-1, Action::Execute, Direction::Down, 0),
            Err(BufferError::NegativeAmount(-1))
        );
    }

    #[test]
    fn input_face_keeps_node_awake() {
        let mut n = node(100, 0);
        assert!(n.is_idle(100, 40));
        n.policy_mut().set_type(Direction::Down, IoType::Input);
        assert!(!n.is_idle(100, 40));
    }

    #[test]
    fn restore_starts_dirty() {
        let mut n = node(100, 25);
        n.policy_mut().set_priority(Direction::North, 3);
        n.cache_mut().mark_clean(0, crate::direction::DirectionSet::ALL, true);

        let state = n.persisted_state();
        let restored = Node::restore(state.clone());
        assert!(restored.cache().is_dirty());
        assert_eq!(restored.buffer().stored(), 25);
        assert_eq!(restored.policy().priority(Direction::North), 3);
        assert_eq!(restored.persisted_state(), state);
    }
}
