//! Grid Layout Planner
//!
//! Pure row/column math. Same inputs, same `Layout`, every time.

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub rows: u32,
    pub cols: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

/// One rectangular region of the canvas, assigned row-major by image index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub index: usize,
    pub row: u32,
    pub col: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Cell {
    /// Cells floor to zero pixels when the canvas is smaller than the grid
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Layout {
    pub fn capacity(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.cols)
    }

    pub fn cell(&self, index: usize) -> Cell {
        let cols = self.cols as usize;
        let row = (index / cols) as u32;
        let col = (index % cols) as u32;
        Cell {
            index,
            row,
            col,
            x: col * self.cell_width,
            y: row * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        }
    }

    pub fn has_degenerate_cells(&self) -> bool {
        self.cell_width == 0 || self.cell_height == 0
    }
}

/// Compute the grid for `image_count` images on a `width` x `height` canvas.
///
/// `rows = ceil(sqrt(n))`, `cols = ceil(n / rows)`, cells are floored.
pub fn plan(image_count: usize, width: u32, height: u32) -> Result<Layout, MergeError> {
    if image_count == 0 {
        return Err(MergeError::InvalidParameters(
            "at least one image is required".into(),
        ));
    }
    if width == 0 || height == 0 {
        return Err(MergeError::InvalidParameters(format!(
            "canvas must be non-empty, got {}x{}",
            width, height
        )));
    }
    let n = u64::try_from(image_count)
        .ok()
        .filter(|n| *n <= u64::from(u32::MAX))
        .ok_or_else(|| MergeError::InvalidParameters(format!("too many images: {}", image_count)))?;

    let rows = ceil_sqrt(n);
    let cols = n.div_ceil(rows);

    // rows <= 65536 and cols <= rows for any n <= u32::MAX
    let rows = rows as u32;
    let cols = cols as u32;

    Ok(Layout {
        rows,
        cols,
        cell_width: width / cols,
        cell_height: height / rows,
    })
}

fn ceil_sqrt(n: u64) -> u64 {
    let mut r = (n as f64).sqrt().ceil() as u64;
    while r > 1 && (r - 1) * (r - 1) >= n {
        r -= 1;
    }
    while r * r < n {
        r += 1;
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_images_square() {
        let layout = plan(4, 1000, 1000).unwrap();
        assert_eq!(
            layout,
            Layout { rows: 2, cols: 2, cell_width: 500, cell_height: 500 }
        );
    }

    #[test]
    fn test_three_images_leave_last_cell_empty() {
        let layout = plan(3, 1000, 1000).unwrap();
        assert_eq!((layout.rows, layout.cols), (2, 2));
        assert_eq!((layout.cell_width, layout.cell_height), (500, 500));

        let cell = layout.cell(2);
        assert_eq!((cell.row, cell.col), (1, 0));
        assert_eq!((cell.x, cell.y), (0, 500));
    }

    #[test]
    fn test_capacity_covers_count() {
        for n in 1..=500usize {
            let layout = plan(n, 4096, 4096).unwrap();
            let rows = (n as f64).sqrt().ceil() as u32;
            assert_eq!(layout.rows, rows, "rows for n={}", n);
            assert_eq!(layout.cols, (n as u32).div_ceil(rows), "cols for n={}", n);
            assert!(layout.capacity() >= n as u64);
        }
    }

    #[test]
    fn test_row_major_assignment() {
        let layout = plan(7, 900, 900).unwrap();
        assert_eq!((layout.rows, layout.cols), (3, 3));
        for index in 0..7 {
            let cell = layout.cell(index);
            assert_eq!(cell.row as usize, index / 3);
            assert_eq!(cell.col as usize, index % 3);
            assert_eq!(cell.x, cell.col * 300);
            assert_eq!(cell.y, cell.row * 300);
        }
    }

    #[test]
    fn test_cells_floor() {
        let layout = plan(5, 1001, 100).unwrap();
        assert_eq!((layout.rows, layout.cols), (3, 2));
        assert_eq!(layout.cell_width, 500);
        assert_eq!(layout.cell_height, 33);
    }

    #[test]
    fn test_degenerate_cells_not_rejected() {
        let layout = plan(9, 2, 2).unwrap();
        assert_eq!(layout.cell_width, 0);
        assert!(layout.has_degenerate_cells());
        assert!(layout.cell(4).is_empty());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(plan(0, 100, 100), Err(MergeError::InvalidParameters(_))));
        assert!(matches!(plan(1, 0, 100), Err(MergeError::InvalidParameters(_))));
        assert!(matches!(plan(1, 100, 0), Err(MergeError::InvalidParameters(_))));
    }

    #[test]
    fn test_plan_deterministic() {
        let a = plan(13, 640, 480).unwrap();
        let b = plan(13, 640, 480).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ceil_sqrt_perfect_squares() {
        assert_eq!(ceil_sqrt(1), 1);
        assert_eq!(ceil_sqrt(16), 4);
        assert_eq!(ceil_sqrt(17), 5);
        assert_eq!(ceil_sqrt(u64::from(u32::MAX)), 65536);
    }
}
