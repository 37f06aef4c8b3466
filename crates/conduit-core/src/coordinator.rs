//! Decides when a node's topology cache is refreshed and performs the refresh.
//!
//! A full rescan happens when the cache is dirty, when the node's phase comes
//! up in the scan interval, or when an active node finds its cache stale.
//! Faces invalidated one at a time are rescanned on their own. Idle nodes skip
//! scheduled and staleness rescans; dirty rescans always run.

use crate::cache::{NeighborKey, TargetInfo, TopologyCache};
use crate::direction::{Direction, DirectionSet};
use crate::fixed::Ticks;
use crate::policy::IoPolicy;
use crate::scheduler::{self, TickPhase};

/// Reads the neighbors of one node on the coordinator's behalf.
pub trait NeighborProbe {
    /// A fresh snapshot of the resource-compatible neighbor behind
    /// `direction`, or `None` if there is none.
    fn probe(&self, direction: Direction, now: Ticks) -> Option<TargetInfo>;

    /// Whether `key` still sits behind `direction`.
    fn still_present(&self, direction: Direction, key: NeighborKey) -> bool;
}

/// Why a full rescan was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanReason {
    Dirty,
    Scheduled,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanKind {
    #[default]
    Skip,
    Partial(DirectionSet),
    Full(ScanReason),
}

impl ScanKind {
    pub fn is_scan(&self) -> bool {
        !matches!(self, ScanKind::Skip)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkCoordinator {
    scan_interval: Ticks,
}

impl NetworkCoordinator {
    pub fn new(scan_interval: Ticks) -> Self {
        Self {
            scan_interval: scan_interval.max(1),
        }
    }

    pub fn scan_interval(&self) -> Ticks {
        self.scan_interval
    }

    /// Pick the rescan, if any, this node needs at `now`.
    pub fn plan_scan(
        &self,
        cache: &TopologyCache,
        phase: TickPhase,
        now: Ticks,
        idle: bool,
    ) -> ScanKind {
        if cache.is_dirty() {
            return ScanKind::Full(ScanReason::Dirty);
        }
        if !idle {
            if scheduler::is_due(phase, now, self.scan_interval, self.scan_interval) {
                return ScanKind::Full(ScanReason::Scheduled);
            }
            if cache.is_stale(now, self.scan_interval) {
                return ScanKind::Full(ScanReason::Stale);
            }
        }
        let pending = cache.dirty_directions();
        if pending.is_empty() {
            ScanKind::Skip
        } else {
            ScanKind::Partial(pending)
        }
    }

    /// Refresh the faces covered by `kind`. Faces whose own I/O type is
    /// disabled are always cleared.
    pub fn rescan(
        &self,
        cache: &mut TopologyCache,
        policy: &IoPolicy,
        probe: &impl NeighborProbe,
        kind: ScanKind,
        now: Ticks,
    ) {
        let (faces, full) = match kind {
            ScanKind::Skip => return,
            ScanKind::Partial(set) => (set, false),
            ScanKind::Full(_) => (DirectionSet::ALL, true),
        };
        for d in faces.iter() {
            let entry = if policy.io_type(d).is_enabled() {
                probe.probe(d, now)
            } else {
                None
            };
            cache.set_entry(d, entry);
        }
        cache.mark_clean(now, faces, full);
    }

    /// Plan and perform in one call. Returns what was done.
    pub fn update_if_needed(
        &self,
        cache: &mut TopologyCache,
        policy: &IoPolicy,
        phase: TickPhase,
        probe: &impl NeighborProbe,
        now: Ticks,
        idle: bool,
    ) -> ScanKind {
        let kind = self.plan_scan(cache, phase, now, idle);
        self.rescan(cache, policy, probe, kind, now);
        kind
    }

    /// Drop entries whose neighbor is gone. Returns how many were pruned.
    pub fn passive_cleanup(&self, cache: &mut TopologyCache, probe: &impl NeighborProbe) -> usize {
        let gone: Vec<Direction> = cache
            .entries()
            .filter(|(d, e)| !probe.still_present(*d, e.key))
            .map(|(d, _)| d)
            .collect();
        for d in &gone {
            cache.set_entry(*d, None);
        }
        gone.len()
    }
}
