//! Network events and the bounded log that holds them until the host drains.
//!
//! Events are recorded as the network ticks and handed out in batch by
//! [`Network::drain_events`](crate::network::Network::drain_events). The log
//! has a fixed capacity; when full, the oldest events are dropped. Kinds can
//! be suppressed so they are never recorded.

use crate::direction::Direction;
use crate::fixed::Ticks;
use crate::grid::GridPos;
use crate::id::{EndpointId, NodeId};
use crate::policy::IoType;
use crate::transfer::FlowIssue;
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A network event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    // -- Membership --
    NodeAdded {
        node: NodeId,
        position: GridPos,
        tick: Ticks,
    },
    NodeRemoved {
        node: NodeId,
        position: GridPos,
        tick: Ticks,
    },
    EndpointAdded {
        endpoint: EndpointId,
        position: GridPos,
        tick: Ticks,
    },
    EndpointRemoved {
        endpoint: EndpointId,
        position: GridPos,
        tick: Ticks,
    },

    // -- Configuration --
    IoConfigChanged {
        node: NodeId,
        direction: Direction,
        io_type: IoType,
        tick: Ticks,
    },
    PriorityChanged {
        node: NodeId,
        direction: Direction,
        priority: i32,
        tick: Ticks,
    },

    // -- Topology --
    /// A rescan changed how many faces have an enabled neighbor.
    AdjacencyChanged {
        node: NodeId,
        connections: usize,
        tick: Ticks,
    },

    // -- Flow --
    FlowIssue {
        node: NodeId,
        direction: Direction,
        issue: FlowIssue,
        tick: Ticks,
    },
    /// A loaded node has been unable to push for a sustained stretch.
    OutputStalled {
        node: NodeId,
        ticks: u32,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NodeAdded,
    NodeRemoved,
    EndpointAdded,
    EndpointRemoved,
    IoConfigChanged,
    PriorityChanged,
    AdjacencyChanged,
    FlowIssue,
    OutputStalled,
}

const EVENT_KIND_COUNT: usize = 9;

impl NetworkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NetworkEvent::NodeAdded { .. } => EventKind::NodeAdded,
            NetworkEvent::NodeRemoved { .. } => EventKind::NodeRemoved,
            NetworkEvent::EndpointAdded { .. } => EventKind::EndpointAdded,
            NetworkEvent::EndpointRemoved { .. } => EventKind::EndpointRemoved,
            NetworkEvent::IoConfigChanged { .. } => EventKind::IoConfigChanged,
            NetworkEvent::PriorityChanged { .. } => EventKind::PriorityChanged,
            NetworkEvent::AdjacencyChanged { .. } => EventKind::AdjacencyChanged,
            NetworkEvent::FlowIssue { .. } => EventKind::FlowIssue,
            NetworkEvent::OutputStalled { .. } => EventKind::OutputStalled,
        }
    }

    pub fn tick(&self) -> Ticks {
        match self {
            NetworkEvent::NodeAdded { tick, .. }
            | NetworkEvent::NodeRemoved { tick, .. }
            | NetworkEvent::EndpointAdded { tick, .. }
            | NetworkEvent::EndpointRemoved { tick, .. }
            | NetworkEvent::IoConfigChanged { tick, .. }
            | NetworkEvent::PriorityChanged { tick, .. }
            | NetworkEvent::AdjacencyChanged { tick, .. }
            | NetworkEvent::FlowIssue { tick, .. }
            | NetworkEvent::OutputStalled { tick, .. } => *tick,
        }
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<NetworkEvent>,
    capacity: usize,
    suppressed: [bool; EVENT_KIND_COUNT],
    /// Total events recorded, including any later dropped.
    total_written: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            suppressed: [false; EVENT_KIND_COUNT],
            total_written: 0,
        }
    }

    /// Record an event unless its kind is suppressed. Returns whether the
    /// event was kept.
    pub fn push(&mut self, event: NetworkEvent) -> bool {
        if self.is_suppressed(event.kind()) {
            return false;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_written += 1;
        true
    }

    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind as usize] = true;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind as usize] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind as usize]
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events dropped because the log was full.
    pub fn dropped(&self) -> u64 {
        self.total_written - self.events.len() as u64
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkEvent> {
        self.events.iter()
    }

    /// Remove and return every stored event, oldest first.
    pub fn drain(&mut self) -> Vec<NetworkEvent> {
        self.events.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn node_id() -> NodeId {
        let mut sm = SlotMap::<NodeId, ()>::with_key();
        sm.insert(())
    }

    fn added(tick: Ticks) -> NetworkEvent {
        NetworkEvent::NodeAdded {
            node: node_id(),
            position: GridPos::new(0, 0, 0),
            tick,
        }
    }

    #[test]
    fn full_log_drops_oldest() {
        let mut log = EventLog::new(3);
        for t in 0..5 {
            log.push(added(t));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.total_written(), 5);
        assert_eq!(log.dropped(), 2);
        let ticks: Vec<Ticks> = log.iter().map(NetworkEvent::tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn drain_empties_in_order() {
        let mut log = EventLog::new(8);
        log.push(added(1));
        log.push(added(2));
        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].tick(), 1);
        assert!(log.is_empty());
        assert_eq!(log.total_written(), 2);
    }

    #[test]
    fn suppressed_kinds_are_not_recorded() {
        let mut log = EventLog::new(8);
        log.suppress(EventKind::NodeAdded);
        assert!(!log.push(added(0)));
        assert!(log.is_empty());
        assert_eq!(log.total_written(), 0);

        log.unsuppress(EventKind::NodeAdded);
        assert!(log.push(added(0)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn zero_capacity_clamped() {
        let mut log = EventLog::new(0);
        assert_eq!(log.capacity(), 1);
        log.push(added(0));
        log.push(added(1));
        assert_eq!(log.iter().next().map(NetworkEvent::tick), Some(1));
    }

    #[test]
    fn kind_matches_variant() {
        let event = NetworkEvent::OutputStalled {
            node: node_id(),
            ticks: 100,
            tick: 9,
        };
        assert_eq!(event.kind(), EventKind::OutputStalled);
        assert_eq!(event.tick(), 9);
    }
}
