//! Host-side resource endpoints.
//!
//! An endpoint is anything adjacent to the mesh that produces or consumes the
//! resource through a fixed interface (generators, machines, storage blocks).
//! The mesh only ever talks to it through [`Endpoint`].

use crate::buffer::{Action, ResourceBuffer};
use crate::fixed::Units;

/// The exchange interface a host object exposes to the mesh.
///
/// `insert` and `extract` follow the same contract as
/// [`ResourceBuffer`]: they clamp, return the amount actually moved, and do
/// nothing on [`Action::Simulate`]. The mesh never passes negative amounts.
pub trait Endpoint: std::fmt::Debug {
    fn stored(&self) -> Units;

    fn capacity(&self) -> Units;

    /// Priority advertised to adjacent conduits. Higher is preferred.
    fn priority(&self) -> i32 {
        0
    }

    /// Room the endpoint is willing to accept right now. Producers that never
    /// accept input override this to return zero.
    fn available(&self) -> Units {
        (self.capacity() - self.stored()).max(0)
    }

    fn insert(&mut self, amount: Units, action: Action) -> Units;

    fn extract(&mut self, amount: Units, action: Action) -> Units;
}

/// An endpoint backed by a plain [`ResourceBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEndpoint {
    pub buffer: ResourceBuffer,
    pub priority: i32,
}

impl BufferEndpoint {
    pub fn new(capacity: Units) -> Self {
        Self {
            buffer: ResourceBuffer::new(capacity),
            priority: 0,
        }
    }

    pub fn with_stored(capacity: Units, stored: Units) -> Self {
        Self {
            buffer: ResourceBuffer::with_stored(capacity, stored),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Endpoint for BufferEndpoint {
    fn stored(&self) -> Units {
        self.buffer.stored()
    }

    fn capacity(&self) -> Units {
        self.buffer.capacity()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn insert(&mut self, amount: Units, action: Action) -> Units {
        self.buffer.insert(amount, action).unwrap_or(0)
    }

    fn extract(&mut self, amount: Units, action: Action) -> Units {
        self.buffer.extract(amount, action).unwrap_or(0)
    }
}
