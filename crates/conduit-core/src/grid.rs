//! 3D grid index mapping cell positions to occupants.
//!
//! The grid is the built-in neighbor-lookup collaborator: given a position and
//! a face, it reports whether the adjacent cell is empty, holds another conduit
//! node, or holds a host endpoint.

use crate::direction::Direction;
use crate::id::{EndpointId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A cell in the 3D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The adjacent cell through `direction`, or `None` past the edge of the
    /// coordinate range.
    pub fn neighbor(&self, direction: Direction) -> Option<GridPos> {
        let (dx, dy, dz) = direction.offset();
        Some(GridPos {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
            z: self.z.checked_add(dz)?,
        })
    }
}

/// What occupies a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occupant {
    Conduit(NodeId),
    Endpoint(EndpointId),
}

/// Result of a neighbor lookup through one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighbor {
    None,
    Peer(NodeId),
    Endpoint(EndpointId),
}

impl From<Option<Occupant>> for Neighbor {
    fn from(occupant: Option<Occupant>) -> Self {
        match occupant {
            None => Neighbor::None,
            Some(Occupant::Conduit(id)) => Neighbor::Peer(id),
            Some(Occupant::Endpoint(id)) => Neighbor::Endpoint(id),
        }
    }
}

/// Resolves what sits next to a position.
pub trait NeighborLookup {
    fn neighbor(&self, pos: GridPos, direction: Direction) -> Neighbor;
}

/// Errors from grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("cell {0:?} is occupied")]
    Occupied(GridPos),
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Sparse occupancy map of the 3D grid. Each cell holds at most one occupant.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    cells: BTreeMap<GridPos, Occupant>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an occupant into an empty cell.
    pub fn place(&mut self, pos: GridPos, occupant: Occupant) -> Result<(), GridError> {
        if self.cells.contains_key(&pos) {
            return Err(GridError::Occupied(pos));
        }
        self.cells.insert(pos, occupant);
        Ok(())
    }

    /// Empty a cell, returning what was there.
    pub fn remove(&mut self, pos: GridPos) -> Option<Occupant> {
        self.cells.remove(&pos)
    }

    pub fn occupant_at(&self, pos: GridPos) -> Option<Occupant> {
        self.cells.get(&pos).copied()
    }

    pub fn is_occupied(&self, pos: GridPos) -> bool {
        self.cells.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// All occupied cells in position order.
    pub fn iter(&self) -> impl Iterator<Item = (GridPos, Occupant)> + '_ {
        self.cells.iter().map(|(p, o)| (*p, *o))
    }

    /// Conduit nodes in the six cells around `pos`, paired with the direction
    /// that leads from `pos` to them.
    pub fn adjacent_conduits(
        &self,
        pos: GridPos,
    ) -> impl Iterator<Item = (Direction, NodeId)> + '_ {
        Direction::ALL.into_iter().filter_map(move |d| {
            match self.occupant_at(pos.neighbor(d)?) {
                Some(Occupant::Conduit(id)) => Some((d, id)),
                _ => None,
            }
        })
    }
}

impl NeighborLookup for Grid {
    fn neighbor(&self, pos: GridPos, direction: Direction) -> Neighbor {
        pos.neighbor(direction)
            .and_then(|cell| self.occupant_at(cell))
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn make_node_ids(count: usize) -> Vec<NodeId> {
        let mut sm = SlotMap::<NodeId, ()>::with_key();
        (0..count).map(|_| sm.insert(())).collect()
    }

    #[test]
    fn neighbor_positions() {
        let p = GridPos::new(0, 0, 0);
        assert_eq!(p.neighbor(Direction::Up), Some(GridPos::new(0, 1, 0)));
        assert_eq!(p.neighbor(Direction::East), Some(GridPos::new(1, 0, 0)));
        assert_eq!(p.neighbor(Direction::North), Some(GridPos::new(0, 0, -1)));
    }

    #[test]
    fn coordinate_edges_have_no_neighbor() {
        let ids = make_node_ids(2);
        let mut grid = Grid::new();
        let max = GridPos::new(i32::MAX, 0, 0);
        let min = GridPos::new(i32::MIN, 0, 0);
        grid.place(max, Occupant::Conduit(ids[0])).unwrap();
        grid.place(min, Occupant::Conduit(ids[1])).unwrap();

        assert_eq!(max.neighbor(Direction::East), None);
        assert_eq!(min.neighbor(Direction::West), None);
        assert_eq!(grid.neighbor(max, Direction::East), Neighbor::None);
        assert_eq!(grid.neighbor(min, Direction::West), Neighbor::None);
        assert_eq!(grid.adjacent_conduits(max).count(), 0);
    }

    #[test]
    fn place_rejects_occupied_cell() {
        let ids = make_node_ids(2);
        let mut grid = Grid::new();
        let p = GridPos::new(1, 2, 3);
        grid.place(p, Occupant::Conduit(ids[0])).unwrap();
        let err = grid.place(p, Occupant::Conduit(ids[1])).unwrap_err();
        assert_eq!(err, GridError::Occupied(p));
        assert_eq!(grid.occupant_at(p), Some(Occupant::Conduit(ids[0])));
    }

    #[test]
    fn lookup_reports_peer_and_empty() {
        let ids = make_node_ids(1);
        let mut grid = Grid::new();
        let origin = GridPos::new(0, 0, 0);
        grid.place(origin.neighbor(Direction::West).unwrap(), Occupant::Conduit(ids[0])).unwrap();

        assert_eq!(grid.neighbor(origin, Direction::West), Neighbor::Peer(ids[0]));
        assert_eq!(grid.neighbor(origin, Direction::East), Neighbor::None);
    }

    #[test]
    fn adjacent_conduits_lists_faces() {
        let ids = make_node_ids(2);
        let mut grid = Grid::new();
        let origin = GridPos::new(5, 5, 5);
        grid.place(origin.neighbor(Direction::Up).unwrap(), Occupant::Conduit(ids[0])).unwrap();
        grid.place(origin.neighbor(Direction::South).unwrap(), Occupant::Conduit(ids[1])).unwrap();

        let adjacent: Vec<_> = grid.adjacent_conduits(origin).collect();
        assert_eq!(adjacent, vec![(Direction::Up, ids[0]), (Direction::South, ids[1])]);
    }

    #[test]
    fn remove_frees_cell() {
        let ids = make_node_ids(1);
        let mut grid = Grid::new();
        let p = GridPos::new(0, 0, 0);
        grid.place(p, Occupant::Conduit(ids[0])).unwrap();
        assert_eq!(grid.remove(p), Some(Occupant::Conduit(ids[0])));
        assert!(!grid.is_occupied(p));
        assert!(grid.is_empty());
    }
}
