//! Puzzle engine: grid generation, hit-testing, match validation,
//! removal animation, and the authoritative per-room game sessions

pub mod animation;
pub mod board;
pub mod grid;
pub mod hit_test;
pub mod matching;
pub mod registry;

pub use animation::{CompletedRemoval, RemovalAnimator};
pub use board::Board;
pub use grid::{Grid, GridError};
pub use hit_test::{DragRect, Point};
pub use matching::{MatchOutcome, RemovalError};
pub use registry::{GameRegistry, GameSession, RemovalDecision};

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::grid::{Grid, CELL_COUNT};

    /// Grid with the leading values set and every other cell removed
    pub fn grid_with_prefix(prefix: &[u8]) -> Grid {
        let mut cells = vec![0; CELL_COUNT];
        cells[..prefix.len()].copy_from_slice(prefix);
        Grid::from_cells(cells).expect("valid test grid")
    }
}
