//! Per-node transfer statistics: tick counting, idle detection, and
//! per-direction activity.

use crate::direction::{DirMap, Direction};
use crate::fixed::{Ticks, Units};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Activity through a single face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionStats {
    /// Tick of the last outbound transfer through this face.
    pub last_transfer_tick: Option<Ticks>,
    /// Number of outbound transfers since the last trim.
    pub transfer_count: u32,
    /// Units pushed out through this face since the last trim.
    pub total_sent: Units,
    /// Tick of the last inbound transfer through this face.
    pub last_received_tick: Option<Ticks>,
}

/// One outbound transfer, kept in a short history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub tick: Ticks,
    pub direction: Direction,
    pub amount: Units,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsTracker {
    ticks: u64,
    directions: DirMap<DirectionStats>,
    history: VecDeque<TransferRecord>,
    history_len: usize,
    last_activity: Option<Ticks>,
    output_failures: u32,
    failure_reported: bool,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new(16)
    }
}

impl StatsTracker {
    /// A tracker that keeps at most `history_len` transfer records.
    pub fn new(history_len: usize) -> Self {
        Self {
            ticks: 0,
            directions: DirMap::default(),
            history: VecDeque::with_capacity(history_len),
            history_len,
            last_activity: None,
            output_failures: 0,
            failure_reported: false,
        }
    }

    /// Count one tick of the owning node.
    pub fn begin_tick(&mut self) {
        self.ticks += 1;
    }

    /// Ticks this node has been through.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// No transfer in or out within `window` ticks and nothing buffered.
    pub fn is_idle(&self, now: Ticks, window: Ticks, buffer_empty: bool) -> bool {
        buffer_empty && self.last_activity.is_none_or(|t| now.saturating_sub(t) >= window)
    }

    pub fn record_transfer(&mut self, direction: Direction, amount: Units, now: Ticks) {
        if amount <= 0 {
            return;
        }
        let entry = &mut self.directions[direction];
        entry.last_transfer_tick = Some(now);
        entry.transfer_count = entry.transfer_count.saturating_add(1);
        entry.total_sent = entry.total_sent.saturating_add(amount);
        self.last_activity = Some(now);

        if self.history_len > 0 {
            if self.history.len() == self.history_len {
                self.history.pop_front();
            }
            self.history.push_back(TransferRecord {
                tick: now,
                direction,
                amount,
            });
        }
    }

    pub fn record_received(&mut self, direction: Direction, now: Ticks) {
        self.directions[direction].last_received_tick = Some(now);
        self.last_activity = Some(now);
    }

    /// Whether this face received resource during tick `now`.
    pub fn received_during(&self, direction: Direction, now: Ticks) -> bool {
        self.directions[direction].last_received_tick == Some(now)
    }

    /// Whether this face pushed resource within the last `window` ticks.
    pub fn is_transferring(&self, direction: Direction, now: Ticks, window: Ticks) -> bool {
        self.directions[direction]
            .last_transfer_tick
            .is_some_and(|t| now.saturating_sub(t) < window)
    }

    pub fn direction(&self, direction: Direction) -> &DirectionStats {
        &self.directions[direction]
    }

    /// Recent outbound transfers, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TransferRecord> {
        self.history.iter()
    }

    /// Total units pushed out across all faces since the last trim.
    pub fn total_sent(&self) -> Units {
        self.directions.values().map(|d| d.total_sent).sum()
    }

    /// Drop history older than `retention` ticks and reset counters of faces
    /// that have been quiet that long. Returns how many records were dropped.
    pub fn trim(&mut self, now: Ticks, retention: Ticks) -> usize {
        let before = self.history.len();
        self.history
            .retain(|r| now.saturating_sub(r.tick) < retention);
        for (_, entry) in self.directions.iter_mut() {
            let quiet = entry
                .last_transfer_tick
                .is_none_or(|t| now.saturating_sub(t) >= retention);
            if quiet {
                entry.transfer_count = 0;
                entry.total_sent = 0;
            }
        }
        before - self.history.len()
    }

    /// Count one tick where buffered resource could not leave the node.
    /// Returns the length of the current streak.
    pub fn note_output_failure(&mut self) -> u32 {
        self.output_failures = self.output_failures.saturating_add(1);
        self.output_failures
    }

    pub fn clear_output_failure(&mut self) {
        self.output_failures = 0;
        self.failure_reported = false;
    }

    pub fn output_failures(&self) -> u32 {
        self.output_failures
    }

    /// Mark the current failure streak as reported. Returns `false` if it
    /// already was.
    pub fn mark_failure_reported(&mut self) -> bool {
        !std::mem::replace(&mut self.failure_reported, true)
    }
}
