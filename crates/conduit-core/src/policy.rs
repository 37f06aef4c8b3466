//! Per-direction I/O policy and priority.
//!
//! Mutations do not call out to listeners. Each effective change is recorded
//! as a [`PolicyEvent`] in an outbox that the owning network drains, so a
//! configuration change can only ever set dirty flags on neighbors.

use crate::direction::{DirMap, Direction};
use serde::{Deserialize, Serialize};

/// Which flows a face participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IoType {
    /// Accepts resource from the neighbor, never pushes to it.
    Input,
    /// Pushes resource to the neighbor, never accepts from it.
    Output,
    #[default]
    Both,
    /// The face is not connected.
    Disabled,
}

impl IoType {
    /// Eligible for outbound flow.
    pub fn can_output(self) -> bool {
        matches!(self, IoType::Output | IoType::Both)
    }

    /// Eligible for inbound flow.
    pub fn can_input(self) -> bool {
        matches!(self, IoType::Input | IoType::Both)
    }

    pub fn is_enabled(self) -> bool {
        self != IoType::Disabled
    }
}

/// Configuration of a single face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct SidePolicy {
    pub io: IoType,
    pub priority: i32,
}

/// A change made to an [`IoPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyEvent {
    IoConfigChanged { direction: Direction, io_type: IoType },
    PriorityChanged { direction: Direction, priority: i32 },
}

impl PolicyEvent {
    pub fn direction(&self) -> Direction {
        match self {
            PolicyEvent::IoConfigChanged { direction, .. }
            | PolicyEvent::PriorityChanged { direction, .. } => *direction,
        }
    }
}

/// Per-face I/O types and priorities, with the construction-time defaults
/// kept around for [`reset_all`](IoPolicy::reset_all).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoPolicy {
    sides: DirMap<SidePolicy>,
    defaults: DirMap<SidePolicy>,
    #[serde(skip)]
    outbox: Vec<PolicyEvent>,
}

impl Default for IoPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPolicy {
    /// Every face `Both` with priority 0.
    pub fn new() -> Self {
        Self::with_defaults(DirMap::default())
    }

    /// A policy whose initial and reset state is `defaults`.
    pub fn with_defaults(defaults: DirMap<SidePolicy>) -> Self {
        Self {
            sides: defaults,
            defaults,
            outbox: Vec::new(),
        }
    }

    pub fn side(&self, direction: Direction) -> SidePolicy {
        self.sides[direction]
    }

    pub fn io_type(&self, direction: Direction) -> IoType {
        self.sides[direction].io
    }

    pub fn priority(&self, direction: Direction) -> i32 {
        self.sides[direction].priority
    }

    /// Set the I/O type of a face. Returns `true` if it changed.
    pub fn set_type(&mut self, direction: Direction, io_type: IoType) -> bool {
        let side = &mut self.sides[direction];
        if side.io == io_type {
            return false;
        }
        side.io = io_type;
        self.outbox.push(PolicyEvent::IoConfigChanged { direction, io_type });
        true
    }

    /// Set the priority of a face. Returns `true` if it changed.
    pub fn set_priority(&mut self, direction: Direction, priority: i32) -> bool {
        let side = &mut self.sides[direction];
        if side.priority == priority {
            return false;
        }
        side.priority = priority;
        self.outbox.push(PolicyEvent::PriorityChanged { direction, priority });
        true
    }

    /// Snapshot of every face's I/O type.
    pub fn io_map(&self) -> DirMap<IoType> {
        self.sides.map(|_, s| s.io)
    }

    /// Apply I/O types for all faces at once. Returns how many changed.
    pub fn set_io_map(&mut self, map: &DirMap<IoType>) -> usize {
        map.iter()
            .filter(|(d, io)| self.set_type(*d, **io))
            .count()
    }

    /// Restore construction-time priorities, leaving I/O types alone.
    pub fn reset_priorities(&mut self) -> usize {
        Direction::ALL
            .into_iter()
            .filter(|d| self.set_priority(*d, self.defaults[*d].priority))
            .count()
    }

    /// Restore construction-time I/O types and priorities.
    pub fn reset_all(&mut self) -> usize {
        let mut changed = 0;
        for d in Direction::ALL {
            let default = self.defaults[d];
            changed += usize::from(self.set_type(d, default.io));
            changed += usize::from(self.set_priority(d, default.priority));
        }
        changed
    }

    /// True if any face accepts input only.
    pub fn has_input_side(&self) -> bool {
        self.sides.values().any(|s| s.io == IoType::Input)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Take all queued change events, oldest first.
    pub fn drain_events(&mut self) -> Vec<PolicyEvent> {
        std::mem::take(&mut self.outbox)
    }
}
