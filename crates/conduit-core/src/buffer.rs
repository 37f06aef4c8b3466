//! Bounded resource container with simulate/execute semantics.
//!
//! Every insert and extract takes an [`Action`]. `Simulate` reports exactly
//! what the matching `Execute` would move under the same state, without
//! touching the buffer. Over-capacity inserts and under-stock extracts clamp
//! instead of failing; only negative amounts are rejected.

use crate::fixed::{Fixed64, Units, ratio};
use serde::{Deserialize, Serialize};

/// Whether an exchange should actually happen or only be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Simulate,
    Execute,
}

impl Action {
    #[inline]
    pub fn is_execute(self) -> bool {
        matches!(self, Action::Execute)
    }
}

/// Errors from buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(Units),
}

/// A bounded store of resource units. Invariant: `0 <= stored <= capacity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBuffer {
    capacity: Units,
    stored: Units,
}

impl ResourceBuffer {
    /// An empty buffer. Negative capacities are treated as zero.
    pub fn new(capacity: Units) -> Self {
        Self {
            capacity: capacity.max(0),
            stored: 0,
        }
    }

    /// A buffer pre-filled with `stored` units, clamped to the capacity.
    pub fn with_stored(capacity: Units, stored: Units) -> Self {
        let capacity = capacity.max(0);
        Self {
            capacity,
            stored: stored.clamp(0, capacity),
        }
    }

    pub fn capacity(&self) -> Units {
        self.capacity
    }

    pub fn stored(&self) -> Units {
        self.stored
    }

    /// Room left before the buffer is full.
    pub fn free(&self) -> Units {
        self.capacity - self.stored
    }

    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    pub fn is_full(&self) -> bool {
        self.stored >= self.capacity
    }

    /// How full the buffer is, from 0 to 1.
    pub fn fill_ratio(&self) -> Fixed64 {
        ratio(self.stored, self.capacity)
    }

    /// Change the capacity. Excess stored units are discarded and returned.
    pub fn set_capacity(&mut self, capacity: Units) -> Units {
        self.capacity = capacity.max(0);
        let excess = (self.stored - self.capacity).max(0);
        self.stored -= excess;
        excess
    }

    /// Insert up to `amount` units. Returns the amount accepted.
    pub fn insert(&mut self, amount: Units, action: Action) -> Result<Units, BufferError> {
        if amount < 0 {
            return Err(BufferError::NegativeAmount(amount));
        }
        let accepted = amount.min(self.free());
        if action.is_execute() {
            self.stored += accepted;
        }
        Ok(accepted)
    }

    /// Extract up to `amount` units. Returns the amount removed.
    pub fn extract(&mut self, amount: Units, action: Action) -> Result<Units, BufferError> {
        if amount < 0 {
            return Err(BufferError::NegativeAmount(amount));
        }
        let removed = amount.min(self.stored);
        if action.is_execute() {
            self.stored -= removed;
        }
        Ok(removed)
    }
}
