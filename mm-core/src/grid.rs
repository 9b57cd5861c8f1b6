//! Flat-backed 2D buffers used for the iteration, mask, and input grids.

use crate::{PixelPoint, Size};

/// A dense 2D array stored row-major, indexed by `(x, y)` with the origin at
/// the bottom-left.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    shape: Size,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn new(shape: Size, fill: T) -> Self {
        Grid {
            shape,
            data: vec![fill; shape.x * shape.y],
        }
    }

    /// Set every cell in the inclusive rectangle to `value`.
    ///
    /// Callers are responsible for orientation and bounds;
    /// `PixelServer::fill_box_request` clamps before calling in.
    pub fn fill_rect(&mut self, bottom_left: PixelPoint, top_right: PixelPoint, value: T) {
        debug_assert!(bottom_left.x <= top_right.x && bottom_left.y <= top_right.y);
        debug_assert!(top_right.x < self.shape.x && top_right.y < self.shape.y);
        for y in bottom_left.y..=top_right.y {
            let row = y * self.shape.x;
            self.data[row + bottom_left.x..=row + top_right.x].fill(value.clone());
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T: Copy + PartialEq> Grid<T> {
    /// The single value shared by every cell of the inclusive rectangle, or
    /// `None` if the region is not uniform.
    pub fn uniform_value(&self, bottom_left: PixelPoint, top_right: PixelPoint) -> Option<T> {
        let value = self[(bottom_left.x, bottom_left.y)];
        for y in bottom_left.y..=top_right.y {
            let row = y * self.shape.x;
            if self.data[row + bottom_left.x..=row + top_right.x]
                .iter()
                .any(|&v| v != value)
            {
                return None;
            }
        }
        Some(value)
    }
}

impl<T> Grid<T> {
    pub fn shape(&self) -> Size {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn index_of(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.shape.x && y < self.shape.y);
        y * self.shape.x + x
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> std::ops::Index<(usize, usize)> for Grid<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &T {
        &self.data[self.index_of(x, y)]
    }
}

impl<T> std::ops::IndexMut<(usize, usize)> for Grid<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        let i = self.index_of(x, y);
        &mut self.data[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: usize, y: usize) -> PixelPoint {
        PixelPoint { x, y }
    }

    #[test]
    fn fill_rect_is_inclusive() {
        let mut g = Grid::new(Size { x: 5, y: 4 }, 0u32);
        g.fill_rect(point(1, 1), point(3, 2), 9);
        assert_eq!(g[(1, 1)], 9);
        assert_eq!(g[(3, 2)], 9);
        assert_eq!(g[(0, 1)], 0);
        assert_eq!(g[(4, 2)], 0);
        assert_eq!(g[(1, 3)], 0);
    }

    #[test]
    fn uniform_value_detects_mismatch() {
        let mut g = Grid::new(Size { x: 4, y: 4 }, 7u32);
        assert_eq!(g.uniform_value(point(0, 0), point(3, 3)), Some(7));
        g[(2, 1)] = 8;
        assert_eq!(g.uniform_value(point(0, 0), point(3, 3)), None);
        assert_eq!(g.uniform_value(point(2, 1), point(2, 1)), Some(8));
    }
}
