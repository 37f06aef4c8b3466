use crate::direction::{DirMap, Direction, DirectionSet};
use crate::fixed::{Ticks, Units};
use crate::id::{EndpointId, NodeId};
use crate::policy::IoType;

/// Lookup key of a cached neighbor. Resolved again on every use; never a
/// live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborKey {
    Peer(NodeId),
    Endpoint(EndpointId),
}

/// Point-in-time snapshot of the neighbor through one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    pub key: NeighborKey,
    pub stored: Units,
    pub available: Units,
    pub priority: i32,
    pub refreshed_at: Ticks,
}

impl TargetInfo {
    pub fn is_peer(&self) -> bool {
        matches!(self.key, NeighborKey::Peer(_))
    }

    /// An entry is trusted for `interval` ticks after it was refreshed.
    pub fn is_fresh(&self, now: Ticks, interval: Ticks) -> bool {
        now.saturating_sub(self.refreshed_at) < interval
    }

    /// Load used for balancing. Endpoints count as empty.
    pub fn load(&self) -> Units {
        if self.is_peer() { self.stored } else { 0 }
    }
}

/// Cached view of a node's six neighbors.
///
/// Starts dirty so the first tick always performs a full scan. Individual
/// faces can be invalidated without dirtying the whole cache; those are
/// rescanned on their own.
#[derive(Debug, Clone)]
pub struct TopologyCache {
    entries: DirMap<Option<TargetInfo>>,
    dirty: bool,
    dirty_directions: DirectionSet,
    last_full_scan: Option<Ticks>,
}

impl Default for TopologyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyCache {
    pub fn new() -> Self {
        Self {
            entries: DirMap::default(),
            dirty: true,
            dirty_directions: DirectionSet::EMPTY,
            last_full_scan: None,
        }
    }

    /// Require a full rescan before the cache is trusted again.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Drop the entry for one face and queue that face for rescan.
    pub fn mark_direction_dirty(&mut self, direction: Direction) {
        self.entries[direction] = None;
        self.dirty_directions.insert(direction);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Faces queued for an individual rescan.
    pub fn dirty_directions(&self) -> DirectionSet {
        self.dirty_directions
    }

    /// Whether anything, whole cache or single face, needs rescanning.
    pub fn needs_refresh(&self) -> bool {
        self.dirty || !self.dirty_directions.is_empty()
    }

    pub fn entry(&self, direction: Direction) -> Option<&TargetInfo> {
        self.entries[direction].as_ref()
    }

    /// Entry for `direction` if it was refreshed within `interval` ticks.
    pub fn fresh_entry(
        &self,
        direction: Direction,
        now: Ticks,
        interval: Ticks,
    ) -> Option<&TargetInfo> {
        self.entry(direction).filter(|t| t.is_fresh(now, interval))
    }

    pub fn set_entry(&mut self, direction: Direction, entry: Option<TargetInfo>) {
        self.entries[direction] = entry;
    }

    pub fn entries(&self) -> impl Iterator<Item = (Direction, &TargetInfo)> {
        self.entries.iter().filter_map(|(d, e)| e.as_ref().map(|e| (d, e)))
    }

    /// Apply a delivery to the cached snapshot so later ticks in the same scan
    /// interval see the reduced headroom.
    pub fn note_delivery(&mut self, direction: Direction, amount: Units) {
        if let Some(entry) = self.entries[direction].as_mut() {
            entry.available = (entry.available - amount).max(0);
            entry.stored = entry.stored.saturating_add(amount);
        }
    }

    /// Record a completed scan. A full scan clears every dirty flag; a
    /// partial scan only clears the faces it covered.
    pub fn mark_clean(&mut self, now: Ticks, scanned: DirectionSet, full: bool) {
        if full {
            self.dirty = false;
            self.dirty_directions.clear();
            self.last_full_scan = Some(now);
        } else {
            for d in scanned.iter() {
                self.dirty_directions.remove(d);
            }
        }
    }

    pub fn last_full_scan(&self) -> Option<Ticks> {
        self.last_full_scan
    }

    /// True if the cache was never fully scanned, or any cached entry has
    /// outlived `interval`.
    pub fn is_stale(&self, now: Ticks, interval: Ticks) -> bool {
        self.last_full_scan.is_none() || self.entries().any(|(_, e)| !e.is_fresh(now, interval))
    }

    /// Faces with a cached entry whose own I/O type is enabled.
    pub fn connection_count(&self, io_types: &DirMap<IoType>) -> usize {
        self.entries()
            .filter(|(d, _)| io_types[*d].is_enabled())
            .count()
    }

    /// Drop every cached entry. The cache is dirty afterwards.
    pub fn clear(&mut self) {
        self.entries = DirMap::default();
        self.dirty = true;
        self.dirty_directions.clear();
    }
}
