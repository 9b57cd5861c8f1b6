//! The request/response pixel server.
//!
//! One server exists per calculation. It owns the per-pixel buffers
//! (input constants, iterations, completed/requested masks), accumulates
//! sparse region requests, deduplicates them against already-completed
//! cells, and dispatches the remainder to the driver in one flat batch per
//! serve cycle.

use num::complex::Complex64;

use crate::context::ComputeContext;
use crate::driver::ComputeDriver;
use crate::grid::Grid;
use crate::mandel::Mandel;
use crate::{Checkpoint, Error, PixelDelta, PixelPoint, Size};

mod request;
pub use request::{CompletedFn, PixelRequest, SameValueFn};

pub struct PixelServer {
    shape: Size,
    c: Grid<Complex64>,
    iteration: Grid<u32>,
    completed: Grid<bool>,
    requested: Grid<bool>,
    requests: Vec<PixelRequest>,
    fill_value: Grid<u32>,
    fill_mask: Grid<bool>,
    has_fills: bool,
    driver: ComputeDriver,
    early_stopping_iteration: Option<u32>,
}

impl PixelServer {
    pub fn new(ctx: &ComputeContext, view: &Mandel, early_stopping_iteration: Option<u32>) -> Self {
        let shape = view.shape;
        PixelServer {
            shape,
            c: view.complex_grid(),
            iteration: Grid::new(shape, 0),
            completed: Grid::new(shape, false),
            requested: Grid::new(shape, false),
            requests: Vec::new(),
            fill_value: Grid::new(shape, 0),
            fill_mask: Grid::new(shape, false),
            has_fills: false,
            driver: ComputeDriver::new(ctx, view.max_iterations),
            early_stopping_iteration,
        }
    }

    /// Build a server for a view derived from `prev` by a pixel offset
    /// (`offset` points from the previous origin to the new origin). The
    /// overlapping region of the previous iteration buffer is copied in and
    /// marked completed, so a pan only computes the newly exposed strip.
    pub fn with_carry_over(
        ctx: &ComputeContext,
        view: &Mandel,
        early_stopping_iteration: Option<u32>,
        prev: &Mandel,
        offset: PixelDelta,
    ) -> Result<Self, Error> {
        let prev_iteration = prev.iteration.as_ref().ok_or_else(|| {
            Error::Configuration("previous view has no iteration buffer to carry over".to_string())
        })?;
        let mut server = Self::new(ctx, view, early_stopping_iteration);
        server.copy_over_prev(prev_iteration, prev.shape, offset);
        Ok(server)
    }

    fn copy_over_prev(&mut self, prev_iteration: &Grid<u32>, prev_shape: Size, offset: PixelDelta) {
        let new = self.shape;
        let x0 = offset.x.max(0);
        let x1 = (prev_shape.x as i64).min(new.x as i64 + offset.x);
        let y0 = offset.y.max(0);
        let y1 = (prev_shape.y as i64).min(new.y as i64 + offset.y);
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        tracing::debug!(
            pixels = (x1 - x0) * (y1 - y0),
            "carrying over previous view"
        );
        for py in y0..y1 {
            let ny = (py - offset.y) as usize;
            for px in x0..x1 {
                let nx = (px - offset.x) as usize;
                self.iteration[(nx, ny)] = prev_iteration[(px as usize, py as usize)];
                self.completed[(nx, ny)] = true;
            }
        }
    }

    pub fn shape(&self) -> Size {
        self.shape
    }

    pub fn complete(&self) -> bool {
        self.completed.as_slice().iter().all(|&done| done)
    }

    pub fn new_request_count(&self) -> usize {
        self.requested
            .as_slice()
            .iter()
            .zip(self.completed.as_slice())
            .filter(|&(&req, &done)| req && !done)
            .count()
    }

    pub fn iteration(&self) -> &Grid<u32> {
        &self.iteration
    }

    /// An owned copy of the iteration buffer in its current state.
    pub fn iteration_snapshot(&self) -> Grid<u32> {
        self.iteration.clone()
    }

    pub fn final_iteration(&self) -> u32 {
        self.driver.final_iteration()
    }

    /// Clamp an inclusive rectangle to the buffer; `None` if it is inverted
    /// or lies outside entirely.
    fn clamp_rect(&self, bottom_left: PixelPoint, top_right: PixelPoint) -> Option<(PixelPoint, PixelPoint)> {
        if bottom_left.x > top_right.x || bottom_left.y > top_right.y {
            return None;
        }
        if bottom_left.x >= self.shape.x || bottom_left.y >= self.shape.y {
            return None;
        }
        let top_right = PixelPoint {
            x: top_right.x.min(self.shape.x - 1),
            y: top_right.y.min(self.shape.y - 1),
        };
        Some((bottom_left, top_right))
    }

    /// Mark a rectangular region as wanted this cycle. Callbacks, if any,
    /// fire once the region has been served.
    pub fn box_request(
        &mut self,
        bottom_left: PixelPoint,
        top_right: PixelPoint,
        same_value: Option<SameValueFn>,
        completed: Option<CompletedFn>,
    ) {
        let Some((bottom_left, top_right)) = self.clamp_rect(bottom_left, top_right) else {
            tracing::warn!(?bottom_left, ?top_right, "ignoring degenerate box request");
            return;
        };
        self.requested.fill_rect(bottom_left, top_right, true);
        if same_value.is_some() || completed.is_some() {
            self.requests
                .push(PixelRequest::new(bottom_left, top_right, same_value, completed));
        }
    }

    /// Mark every `step`-th row and column as wanted: the cheap coarse
    /// sampling the mesh algorithm is built on.
    pub fn grid_lines_request(&mut self, step: usize) {
        debug_assert!(step > 0);
        if step == 0 {
            return;
        }
        for y in 0..self.shape.y {
            if y % step == 0 {
                for x in 0..self.shape.x {
                    self.requested[(x, y)] = true;
                }
            } else {
                for x in (0..self.shape.x).step_by(step) {
                    self.requested[(x, y)] = true;
                }
            }
        }
    }

    /// Mark everything not yet completed as wanted: the final catch-all pass.
    pub fn request_incomplete(&mut self) {
        let requested = self.requested.as_mut_slice();
        for (req, &done) in requested.iter_mut().zip(self.completed.as_slice()) {
            *req = !done;
        }
    }

    /// Stamp a known uniform value over a region without computing it.
    /// Degenerate rectangles are ignored rather than corrupting the buffer.
    pub fn fill_box_request(
        &mut self,
        bottom_left: PixelPoint,
        top_right: PixelPoint,
        value: u32,
        completed: Option<CompletedFn>,
    ) {
        let Some((bottom_left, top_right)) = self.clamp_rect(bottom_left, top_right) else {
            tracing::warn!(?bottom_left, ?top_right, "ignoring degenerate fill request");
            return;
        };
        self.fill_value.fill_rect(bottom_left, top_right, value);
        self.fill_mask.fill_rect(bottom_left, top_right, true);
        self.has_fills = true;
        if let Some(callback) = completed {
            callback();
        }
    }

    /// Resolve everything accumulated since the last cycle: apply fill
    /// stamps, compute the deduplicated set of newly requested cells, fan
    /// results back into the iteration buffer, fire request callbacks, and
    /// reset the single-shot request state.
    ///
    /// Returns `None` if the checkpoint asked to stop mid-computation.
    pub fn serve(&mut self, checkpoint: &mut dyn Checkpoint) -> Option<()> {
        if self.has_fills {
            self.apply_fills();
        }

        let mut positions: Vec<usize> = Vec::new();
        let mut batch: Vec<Complex64> = Vec::new();
        {
            let requested = self.requested.as_slice();
            let completed = self.completed.as_slice();
            let c = self.c.as_slice();
            for i in 0..requested.len() {
                if requested[i] && !completed[i] {
                    positions.push(i);
                    batch.push(c[i]);
                }
            }
        }

        if !positions.is_empty() {
            tracing::debug!(pixels = positions.len(), "serving new requests");
            let result =
                self.driver
                    .compute_flat_array(&batch, self.early_stopping_iteration, checkpoint)?;
            let iteration = self.iteration.as_mut_slice();
            let completed = self.completed.as_mut_slice();
            for (&i, value) in positions.iter().zip(result) {
                iteration[i] = value;
                completed[i] = true;
            }
        }

        for request in std::mem::take(&mut self.requests) {
            request.respond(&self.iteration);
        }
        self.reset();
        Some(())
    }

    fn apply_fills(&mut self) {
        let mask = self.fill_mask.as_slice();
        let values = self.fill_value.as_slice();
        let iteration = self.iteration.as_mut_slice();
        let completed = self.completed.as_mut_slice();
        for i in 0..mask.len() {
            if mask[i] {
                iteration[i] = values[i];
                completed[i] = true;
            }
        }
    }

    fn reset(&mut self) {
        self.requested.fill(false);
        self.fill_value.fill(0);
        self.fill_mask.fill(false);
        self.has_fills = false;
    }
}
