//! Grid generation and the authoritative cell array

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Columns on the board
pub const GRID_WIDTH: usize = 20;
/// Rows on the board
pub const GRID_HEIGHT: usize = 15;
/// Total number of cells
pub const CELL_COUNT: usize = GRID_WIDTH * GRID_HEIGHT;
/// Largest digit a cell can carry
pub const MAX_CELL_VALUE: u8 = 9;
/// Whole-board regeneration cap; convergence is near-immediate in practice
pub const MAX_GENERATION_ATTEMPTS: u32 = 10_000;

/// Grid errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("grid must have {CELL_COUNT} cells, got {0}")]
    InvalidLength(usize),

    #[error("cell {index} has out-of-range value {value}")]
    InvalidValue { index: usize, value: u8 },

    #[error("grid generation did not converge after {0} attempts")]
    GenerationExhausted(u32),
}

/// Row-major board of cell values. 0 marks a removed cell, 1-9 an active digit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Grid {
    cells: Vec<u8>,
}

impl Grid {
    /// A board with every cell removed. Used before the first snapshot arrives.
    pub fn empty() -> Self {
        Self {
            cells: vec![0; CELL_COUNT],
        }
    }

    /// Build a grid from raw values, rejecting wrong lengths and digits above 9
    pub fn from_cells(cells: Vec<u8>) -> Result<Self, GridError> {
        if cells.len() != CELL_COUNT {
            return Err(GridError::InvalidLength(cells.len()));
        }
        if let Some((index, &value)) = cells
            .iter()
            .enumerate()
            .find(|&(_, &v)| v > MAX_CELL_VALUE)
        {
            return Err(GridError::InvalidValue { index, value });
        }
        Ok(Self { cells })
    }

    /// Generate a board whose total is a positive multiple of 10.
    ///
    /// Each cell is drawn uniformly from 1..=9 and the whole board is redrawn
    /// until the total satisfies the invariant. Only the total is bounded, so
    /// a board may still contain sub-regions with no possible match.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Result<Self, GridError> {
        Self::generate_with_limit(rng, MAX_GENERATION_ATTEMPTS)
    }

    pub fn generate_with_limit<R: Rng + ?Sized>(
        rng: &mut R,
        max_attempts: u32,
    ) -> Result<Self, GridError> {
        for _ in 0..max_attempts {
            let cells: Vec<u8> = (0..CELL_COUNT)
                .map(|_| rng.gen_range(1..=MAX_CELL_VALUE))
                .collect();
            let total: u32 = cells.iter().map(|&v| u32::from(v)).sum();
            if total > 0 && total % 10 == 0 {
                return Ok(Self { cells });
            }
        }
        Err(GridError::GenerationExhausted(max_attempts))
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.cells.get(index).copied()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.get(index).is_some_and(|v| v > 0)
    }

    /// Zero the given cells. Out-of-range indices are ignored.
    pub fn clear(&mut self, indices: &[usize]) {
        for &index in indices {
            if let Some(cell) = self.cells.get_mut(index) {
                *cell = 0;
            }
        }
    }

    pub fn total(&self) -> u32 {
        self.cells.iter().map(|&v| u32::from(v)).sum()
    }

    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|&&v| v > 0).count()
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// (column, row) of a row-major index
    pub fn position(index: usize) -> (usize, usize) {
        (index % GRID_WIDTH, index / GRID_WIDTH)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::empty()
    }
}

impl TryFrom<Vec<u8>> for Grid {
    type Error = GridError;

    fn try_from(cells: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_cells(cells)
    }
}

impl From<Grid> for Vec<u8> {
    fn from(grid: Grid) -> Self {
        grid.cells
    }
}
