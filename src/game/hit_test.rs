//! Drag rectangle geometry and circular hit-testing

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::grid::{Grid, GRID_HEIGHT, GRID_WIDTH};

/// Distance between neighbouring cell centers
pub const CELL_SIZE: f32 = 50.0;
/// Gap between a cell's edge and its circle
pub const CELL_PADDING: f32 = 5.0;
/// Collision radius of a cell
pub const HIT_RADIUS: f32 = (CELL_SIZE - CELL_PADDING * 2.0) / 2.0;
/// Offset from the canvas origin to the first cell's edge
pub const GRID_OFFSET: f32 = 100.0;
/// Canvas dimensions including the offset margin on both sides
pub const CANVAS_WIDTH: f32 = GRID_WIDTH as f32 * CELL_SIZE + GRID_OFFSET * 2.0;
pub const CANVAS_HEIGHT: f32 = GRID_HEIGHT as f32 * CELL_SIZE + GRID_OFFSET * 2.0;

/// A point in canvas space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned selection rectangle, normalized so width and height are never negative
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DragRect {
    /// Rectangle spanned by the pointer-down point and the current pointer
    pub fn from_points(start: Point, current: Point) -> Self {
        Self {
            x: start.x.min(current.x),
            y: start.y.min(current.y),
            width: (current.x - start.x).abs(),
            height: (current.y - start.y).abs(),
        }
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    /// True if a circle overlaps this rectangle's radius-expanded bounds
    pub fn touches_circle(&self, center: Point, radius: f32) -> bool {
        center.x + radius >= self.x
            && center.x - radius <= self.max_x()
            && center.y + radius >= self.y
            && center.y - radius <= self.max_y()
    }
}

/// Canvas-space center of the cell at `index`
pub fn cell_center(index: usize) -> Point {
    let (col, row) = Grid::position(index);
    Point {
        x: col as f32 * CELL_SIZE + CELL_SIZE / 2.0 + GRID_OFFSET,
        y: row as f32 * CELL_SIZE + CELL_SIZE / 2.0 + GRID_OFFSET,
    }
}

/// Indices of active cells whose hit circle overlaps `rect`.
///
/// Partially covered cells count. Removed cells are never selected.
pub fn hit_test(grid: &Grid, rect: &DragRect) -> BTreeSet<usize> {
    grid.cells()
        .iter()
        .enumerate()
        .filter(|&(_, &value)| value > 0)
        .map(|(index, _)| index)
        .filter(|&index| rect.touches_circle(cell_center(index), HIT_RADIUS))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::CELL_COUNT;
    use crate::game::test_helpers::grid_with_prefix;
    use proptest::prelude::*;

    fn full_grid() -> Grid {
        Grid::from_cells(vec![1; CELL_COUNT]).unwrap()
    }

    #[test]
    fn first_cell_center_includes_offset() {
        assert_eq!(cell_center(0), Point::new(125.0, 125.0));
        assert_eq!(cell_center(21), Point::new(175.0, 175.0));
        assert_eq!(HIT_RADIUS, 20.0);
    }

    #[test]
    fn rect_is_normalized_from_any_drag_direction() {
        let rect = DragRect::from_points(Point::new(200.0, 150.0), Point::new(100.0, 110.0));
        assert_eq!(rect, DragRect { x: 100.0, y: 110.0, width: 100.0, height: 40.0 });
    }

    #[test]
    fn row_prefix_selection() {
        let grid = grid_with_prefix(&[3, 3, 4]);
        let rect = DragRect::from_points(Point::new(110.0, 110.0), Point::new(240.0, 140.0));
        let hits: Vec<usize> = hit_test(&grid, &rect).into_iter().collect();
        assert_eq!(hits, vec![0, 1, 2]);
    }

    #[test]
    fn partial_overlap_selects() {
        let grid = full_grid();
        // Only grazes the right edge of cell 0's circle (x 105..145)
        let rect = DragRect::from_points(Point::new(144.0, 124.0), Point::new(150.0, 126.0));
        assert!(hit_test(&grid, &rect).contains(&0));
    }

    #[test]
    fn gap_between_circles_selects_nothing() {
        let grid = full_grid();
        // Between cell 0 (ends at 145) and cell 1 (starts at 155)
        let rect = DragRect::from_points(Point::new(146.0, 120.0), Point::new(154.0, 130.0));
        assert!(hit_test(&grid, &rect).is_empty());
    }

    #[test]
    fn removed_cells_are_skipped() {
        let grid = grid_with_prefix(&[5, 0, 5]);
        let rect = DragRect::from_points(Point::new(100.0, 100.0), Point::new(250.0, 150.0));
        let hits: Vec<usize> = hit_test(&grid, &rect).into_iter().collect();
        assert_eq!(hits, vec![0, 2]);
    }

    #[test]
    fn zero_sized_rect_on_center_selects_that_cell() {
        let grid = full_grid();
        let center = cell_center(45);
        let rect = DragRect::from_points(center, center);
        assert_eq!(hit_test(&grid, &rect).into_iter().collect::<Vec<_>>(), vec![45]);
    }

    proptest! {
        #[test]
        fn enlarging_rect_never_shrinks_selection(
            x in 0u16..1200,
            y in 0u16..950,
            w in 0u16..400,
            h in 0u16..400,
            grow in (0u16..200, 0u16..200, 0u16..200, 0u16..200),
        ) {
            // Whole-pixel inputs keep the float arithmetic exact
            let (left, right, up, down) = grow;
            let grid = full_grid();
            let small = DragRect {
                x: f32::from(x),
                y: f32::from(y),
                width: f32::from(w),
                height: f32::from(h),
            };
            let large = DragRect {
                x: f32::from(x) - f32::from(left),
                y: f32::from(y) - f32::from(up),
                width: f32::from(w) + f32::from(left) + f32::from(right),
                height: f32::from(h) + f32::from(up) + f32::from(down),
            };
            let small_hits = hit_test(&grid, &small);
            let large_hits = hit_test(&grid, &large);
            prop_assert!(small_hits.is_subset(&large_hits));
        }

        #[test]
        fn hit_test_is_idempotent(x in 0.0f32..1200.0, y in 0.0f32..950.0, w in 0.0f32..300.0) {
            let grid = full_grid();
            let rect = DragRect { x, y, width: w, height: w };
            prop_assert_eq!(hit_test(&grid, &rect), hit_test(&grid, &rect));
        }
    }
}
