//! The six axis-aligned adjacency slots of a node and fixed-size maps keyed
//! by them.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// One of the six faces of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

/// Errors from converting raw values into directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DirectionError {
    #[error("unknown direction index {0}")]
    Unknown(u8),
}

impl Direction {
    /// Number of directions.
    pub const COUNT: usize = 6;

    /// All six directions in index order.
    pub const ALL: [Direction; 6] = [
        Direction::Down,
        Direction::Up,
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    /// Index into a [`DirMap`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The face on the other side of the shared boundary.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }

    /// Grid offset `(dx, dy, dz)` for this direction. +y is up, +z is south.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::Down => (0, -1, 0),
            Direction::Up => (0, 1, 0),
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::West => (-1, 0, 0),
            Direction::East => (1, 0, 0),
        }
    }

    #[inline]
    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl TryFrom<u8> for Direction {
    type Error = DirectionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Direction::ALL
            .get(value as usize)
            .copied()
            .ok_or(DirectionError::Unknown(value))
    }
}

// ---------------------------------------------------------------------------
// DirMap
// ---------------------------------------------------------------------------

/// A total map from [`Direction`] to `T`, stored inline as a 6-slot array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct DirMap<T>([T; 6]);

impl<T> DirMap<T> {
    /// Build a map by evaluating `f` for every direction.
    pub fn from_fn(mut f: impl FnMut(Direction) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Direction::ALL[i])))
    }

    /// Build a map with the same value in every slot.
    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_fn(|_| value.clone())
    }

    pub fn get(&self, direction: Direction) -> &T {
        &self.0[direction.index()]
    }

    pub fn get_mut(&mut self, direction: Direction) -> &mut T {
        &mut self.0[direction.index()]
    }

    /// Replace the value for `direction`, returning the previous one.
    pub fn set(&mut self, direction: Direction, value: T) -> T {
        std::mem::replace(&mut self.0[direction.index()], value)
    }

    /// Iterate `(direction, value)` pairs in direction order.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, &T)> {
        Direction::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Direction, &mut T)> {
        Direction::ALL.into_iter().zip(self.0.iter_mut())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    /// Map every slot through `f`.
    pub fn map<U>(&self, mut f: impl FnMut(Direction, &T) -> U) -> DirMap<U> {
        DirMap::from_fn(|d| f(d, &self.0[d.index()]))
    }
}

impl<T> Index<Direction> for DirMap<T> {
    type Output = T;

    fn index(&self, direction: Direction) -> &T {
        self.get(direction)
    }
}

impl<T> IndexMut<Direction> for DirMap<T> {
    fn index_mut(&mut self, direction: Direction) -> &mut T {
        self.get_mut(direction)
    }
}

// ---------------------------------------------------------------------------
// DirectionSet
// ---------------------------------------------------------------------------

/// A compact set of directions (one bit per face).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct DirectionSet(u8);

impl DirectionSet {
    pub const EMPTY: DirectionSet = DirectionSet(0);
    pub const ALL: DirectionSet = DirectionSet(0b11_1111);

    pub fn insert(&mut self, direction: Direction) {
        self.0 |= direction.bit();
    }

    pub fn remove(&mut self, direction: Direction) {
        self.0 &= !direction.bit();
    }

    pub fn contains(&self, direction: Direction) -> bool {
        self.0 & direction.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL.into_iter().filter(|d| self.contains(*d))
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut set = DirectionSet::EMPTY;
        for d in iter {
            set.insert(d);
        }
        set
    }
}
