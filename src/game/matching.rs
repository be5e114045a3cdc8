//! Match validation: a selection clears when its values sum to exactly ten

use std::collections::BTreeSet;

use super::grid::Grid;

/// The only accepted selection total
pub const TARGET_SUM: u32 = 10;

/// Result of validating a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Selection sums to ten; score goes up by the number of cells
    Accepted { score_delta: u32 },
    /// Anything else. Silent, never reported as an error.
    Rejected,
}

impl MatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn score_delta(&self) -> u32 {
        match self {
            Self::Accepted { score_delta } => *score_delta,
            Self::Rejected => 0,
        }
    }
}

/// Sum of the selected cells' values. Out-of-range indices contribute nothing.
pub fn selection_sum(grid: &Grid, selection: &BTreeSet<usize>) -> u32 {
    selection
        .iter()
        .filter_map(|&index| grid.get(index))
        .map(u32::from)
        .sum()
}

/// Accept iff the selected values sum to exactly ten.
///
/// There is no cardinality floor; the rule is purely sum based.
pub fn validate(grid: &Grid, selection: &BTreeSet<usize>) -> MatchOutcome {
    if selection_sum(grid, selection) == TARGET_SUM {
        MatchOutcome::Accepted {
            score_delta: selection.len() as u32,
        }
    } else {
        MatchOutcome::Rejected
    }
}

/// Removal request rejection reasons (authoritative revalidation)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemovalError {
    #[error("no cells selected")]
    Empty,

    #[error("cell index {0} is out of range")]
    OutOfRange(usize),

    #[error("cell index {0} listed more than once")]
    Duplicate(usize),

    #[error("cell {0} is already removed")]
    AlreadyRemoved(usize),

    #[error("selected cells sum to {0}, not {TARGET_SUM}")]
    WrongSum(u32),
}

/// Strict check used by the authority before applying a peer's removal.
///
/// Unlike [`validate`], the raw index list is checked for range, duplicates
/// and already-removed cells, since it did not come from a local hit test.
pub fn revalidate_removal(grid: &Grid, indices: &[usize]) -> Result<BTreeSet<usize>, RemovalError> {
    if indices.is_empty() {
        return Err(RemovalError::Empty);
    }

    let mut selection = BTreeSet::new();
    for &index in indices {
        match grid.get(index) {
            None => return Err(RemovalError::OutOfRange(index)),
            Some(0) => return Err(RemovalError::AlreadyRemoved(index)),
            Some(_) => {}
        }
        if !selection.insert(index) {
            return Err(RemovalError::Duplicate(index));
        }
    }

    match validate(grid, &selection) {
        MatchOutcome::Accepted { .. } => Ok(selection),
        MatchOutcome::Rejected => Err(RemovalError::WrongSum(selection_sum(grid, &selection))),
    }
}
