//! Cells, fleets and shot histories on the shared grid.

use alloc::vec::Vec;
use core::fmt;

use crate::bitboard::BitBoard;
use crate::config::{FLEET_SIZE, GRID_CELLS, GRID_SIZE};
use crate::error::{GameError, PlacementError};

/// Bitboard sized for the game grid.
pub type Grid = BitBoard<u128, GRID_SIZE>;

/// A validated cell on the grid, stored as its flat index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell(usize);

impl Cell {
    pub fn from_index(index: usize) -> Option<Self> {
        (index < GRID_CELLS).then_some(Cell(index))
    }

    pub fn from_coords(row: usize, col: usize) -> Result<Self, GameError> {
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return Err(GameError::OutOfBounds { row, col });
        }
        Ok(Cell(row * GRID_SIZE + col))
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn row(self) -> usize {
        self.0 / GRID_SIZE
    }

    pub fn col(self) -> usize {
        self.0 % GRID_SIZE
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row(), self.col())
    }
}

/// Result of a resolved shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    Hit,
    Miss,
}

/// A player's deployed ships: exactly [`FLEET_SIZE`] distinct cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fleet {
    cells: Grid,
}

impl Fleet {
    /// Validate a placement request.
    pub fn new(cells: &[usize]) -> Result<Self, PlacementError> {
        if cells.len() != FLEET_SIZE {
            return Err(PlacementError::WrongSize {
                expected: FLEET_SIZE,
                got: cells.len(),
            });
        }
        let mut grid = Grid::new();
        for &index in cells {
            match grid.get_index(index) {
                Err(_) => return Err(PlacementError::OutOfBounds(index)),
                Ok(true) => return Err(PlacementError::Duplicate(index)),
                Ok(false) => {}
            }
            grid.set_index(index)
                .map_err(|_| PlacementError::OutOfBounds(index))?;
        }
        Ok(Self { cells: grid })
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.get_index(cell.index()).unwrap_or(false)
    }

    pub fn cells(&self) -> Grid {
        self.cells
    }

    /// Cell indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.cells.iter_indices().collect()
    }

    /// True once every ship cell appears in `hits`.
    pub fn is_sunk_by(&self, hits: &Grid) -> bool {
        hits.contains_all(&self.cells)
    }
}

/// Shots fired by one player at the opponent's board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct ShotBoard {
    pub hits: Grid,
    pub misses: Grid,
}

impl ShotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attacked(&self, cell: Cell) -> bool {
        let idx = cell.index();
        self.hits.get_index(idx).unwrap_or(false) || self.misses.get_index(idx).unwrap_or(false)
    }

    pub fn outcome_at(&self, cell: Cell) -> Option<Outcome> {
        if self.hits.get_index(cell.index()).unwrap_or(false) {
            Some(Outcome::Hit)
        } else if self.misses.get_index(cell.index()).unwrap_or(false) {
            Some(Outcome::Miss)
        } else {
            None
        }
    }

    /// Record a shot. Each cell can be recorded once.
    pub fn record(&mut self, cell: Cell, outcome: Outcome) -> Result<(), GameError> {
        if self.is_attacked(cell) {
            return Err(GameError::CellAlreadyAttacked);
        }
        let board = match outcome {
            Outcome::Hit => &mut self.hits,
            Outcome::Miss => &mut self.misses,
        };
        board
            .set_index(cell.index())
            .map_err(|_| GameError::OutOfBounds {
                row: cell.row(),
                col: cell.col(),
            })
    }

    pub fn shots_fired(&self) -> usize {
        self.hits.count_ones() + self.misses.count_ones()
    }
}
