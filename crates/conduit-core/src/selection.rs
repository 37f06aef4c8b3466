//! Choosing one output face from a set of candidates.
//!
//! Selection is a pure function of the candidates, the tick, and the balance
//! tolerance:
//!
//! 1. Every candidate within `tolerance` of the highest effective priority is
//!    a contender. With a tolerance of zero only exact ties contend.
//! 2. Among contenders the lowest load wins.
//! 3. Equal loads fall back to the higher effective priority.
//! 4. Anything still tied is broken round-robin by `tick mod ties`, in
//!    direction order.
//!
//! Priority therefore dominates only when it leads by more than the
//! tolerance.

use crate::direction::Direction;
use crate::fixed::{Ticks, Units};

/// An output face eligible for this tick's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub direction: Direction,
    /// Advertised priority of the target plus this node's priority on the face.
    pub effective_priority: i64,
    /// Current load of the target (its stored units; endpoints count as 0).
    pub load: Units,
    /// Units the target can take.
    pub available: Units,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionStrategy {
    tolerance: i64,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl SelectionStrategy {
    /// A strategy with the given priority/balance tolerance. Negative values
    /// are treated as zero.
    pub fn new(tolerance: i64) -> Self {
        Self {
            tolerance: tolerance.max(0),
        }
    }

    pub fn tolerance(&self) -> i64 {
        self.tolerance
    }

    pub fn select(&self, candidates: &[Candidate], tick: Ticks) -> Option<Candidate> {
        let top = candidates.iter().map(|c| c.effective_priority).max()?;
        let floor = top.saturating_sub(self.tolerance);
        let contenders = candidates.iter().filter(|c| c.effective_priority >= floor);

        let min_load = contenders.clone().map(|c| c.load).min()?;
        let balanced = contenders.filter(|c| c.load == min_load);

        let best = balanced.clone().map(|c| c.effective_priority).max()?;
        let mut tied: Vec<&Candidate> = balanced.filter(|c| c.effective_priority == best).collect();
        tied.sort_by_key(|c| c.direction);

        let pick = (tick % tied.len() as u64) as usize;
        Some(*tied[pick])
    }
}
