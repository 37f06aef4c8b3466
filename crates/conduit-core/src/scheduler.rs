//! Deterministic phase assignment for staggered periodic work.
//!
//! Every node gets a phase in `[0, interval)` from a monotonically increasing
//! counter owned by the network. Periodic work for a node runs once per
//! cadence at an offset scaled from its phase, so a population created in
//! sequence spreads its rescans and maintenance evenly across each period
//! instead of bursting on a few ticks.

use crate::fixed::Ticks;
use serde::{Deserialize, Serialize};

/// A node's stagger offset. Assigned once at creation and kept for life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TickPhase(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickScheduler {
    interval: Ticks,
    issued: u64,
}

impl TickScheduler {
    /// A scheduler spreading phases over `interval` ticks. Zero is clamped to 1.
    pub fn new(interval: Ticks) -> Self {
        Self {
            interval: interval.max(1),
            issued: 0,
        }
    }

    pub fn interval(&self) -> Ticks {
        self.interval
    }

    /// Number of phases handed out so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Hand out the next phase.
    pub fn assign(&mut self) -> TickPhase {
        let phase = TickPhase(self.issued % self.interval);
        self.issued += 1;
        phase
    }

    /// Whether work on a `cadence`-tick period is due for `phase` at `now`.
    pub fn is_due(&self, phase: TickPhase, now: Ticks, cadence: Ticks) -> bool {
        is_due(phase, now, cadence, self.interval)
    }
}

/// Tick within a `cadence`-tick period at which `phase` runs, for phases
/// handed out over `interval` ticks. Equal to the phase when the cadence is
/// the interval itself.
pub fn offset(phase: TickPhase, cadence: Ticks, interval: Ticks) -> Ticks {
    let cadence = cadence.max(1) as u128;
    let interval = interval.max(1);
    let phase = (phase.0 % interval) as u128;
    (phase * cadence / interval as u128) as Ticks
}

/// Whether `cadence`-tick work is due for `phase` at `now`.
pub fn is_due(phase: TickPhase, now: Ticks, cadence: Ticks, interval: Ticks) -> bool {
    now % cadence.max(1) == offset(phase, cadence, interval)
}
