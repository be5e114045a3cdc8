//! Client play surface: drag selection, match acceptance and removal commits

use std::collections::BTreeSet;

use tracing::debug;

use super::animation::{CompletedRemoval, RemovalAnimator};
use super::grid::Grid;
use super::hit_test::{hit_test, DragRect, Point};
use super::matching::{validate, MatchOutcome};

/// One player's view of the board.
///
/// All mutation goes through `&mut self`, so a pointer event, an animation
/// tick and an inbound snapshot can never interleave mid-update.
#[derive(Debug, Default)]
pub struct Board {
    grid: Grid,
    selection: BTreeSet<usize>,
    drag_start: Option<Point>,
    drag_rect: Option<DragRect>,
    animator: RemovalAnimator,
    score: u32,
}

impl Board {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            ..Self::default()
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn selection(&self) -> &BTreeSet<usize> {
        &self.selection
    }

    pub fn drag_rect(&self) -> Option<DragRect> {
        self.drag_rect
    }

    pub fn animator(&self) -> &RemovalAnimator {
        &self.animator
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_start.is_some()
    }

    pub fn pointer_down(&mut self, point: Point) {
        self.drag_start = Some(point);
        self.drag_rect = Some(DragRect::from_points(point, point));
        self.selection.clear();
    }

    /// Update the drag rectangle and recompute the selection
    pub fn pointer_move(&mut self, point: Point) -> &BTreeSet<usize> {
        if let Some(start) = self.drag_start {
            let rect = DragRect::from_points(start, point);
            self.selection = hit_test(&self.grid, &rect);
            self.drag_rect = Some(rect);
        }
        &self.selection
    }

    /// Finish the drag. An accepted match starts its removal animation and
    /// scores immediately; anything else is dropped silently. Selections that
    /// touch a cell already mid-removal are rejected.
    pub fn pointer_up(&mut self) -> MatchOutcome {
        let selection = std::mem::take(&mut self.selection);
        self.drag_start = None;
        self.drag_rect = None;

        if self.animator.overlaps(&selection) {
            debug!(cells = selection.len(), "Selection overlaps an in-flight removal");
            return MatchOutcome::Rejected;
        }

        let outcome = validate(&self.grid, &selection);
        if let MatchOutcome::Accepted { score_delta } = outcome {
            self.animator.start(&selection);
            self.score += score_delta;
        }
        outcome
    }

    /// Advance removal animations. Finished batches are committed to the grid
    /// before being returned, so callers publish only committed removals.
    pub fn tick(&mut self) -> Vec<CompletedRemoval> {
        let completed = self.animator.tick();
        for removal in &completed {
            self.grid.clear(&removal.indices);
        }
        completed
    }

    /// Zero cells removed by a peer
    pub fn apply_removal(&mut self, indices: &[usize]) {
        self.grid.clear(indices);
        if self.is_dragging() {
            self.selection.retain(|&i| self.grid.is_active(i));
        }
    }

    /// Replace the grid with an authoritative snapshot. An in-flight removal
    /// keeps animating while all its cells are still present in the snapshot;
    /// any other is cancelled without being committed. Returns how many were
    /// cancelled.
    pub fn replace_grid(&mut self, grid: Grid) -> usize {
        self.grid = grid;
        let grid = &self.grid;
        let cancelled = self
            .animator
            .cancel_where(|cells| cells.iter().any(|&i| !grid.is_active(i)));
        if let Some(rect) = self.drag_rect.filter(|_| self.is_dragging()) {
            self.selection = hit_test(&self.grid, &rect);
        }
        cancelled
    }

    /// Start a fresh game: new grid, zero score, nothing selected
    pub fn reset(&mut self, grid: Grid) {
        *self = Self::new(grid);
    }
}
