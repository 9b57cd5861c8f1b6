//! Coarse-to-fine mesh refinement.
//!
//! Fractal iteration fields are piecewise near-constant away from the set
//! boundary, so sampling a box's perimeter is strong evidence about its
//! interior. Each pass requests grid lines at one mesh spacing, then stamps
//! the interior of every box whose boundary samples all agree; a final
//! catch-all pass computes whatever is left. Detailed regions are computed
//! pixel-exact; uniform regions are stamped at a fraction of the cost.

use crate::grid::Grid;
use crate::server::PixelServer;
use crate::{Checkpoint, PixelPoint, Size};

const BASE_STEP: usize = 14;

pub struct Mesh<'a> {
    server: &'a mut PixelServer,
    shape: Size,
}

impl<'a> Mesh<'a> {
    pub fn new(server: &'a mut PixelServer) -> Self {
        let shape = server.shape();
        Mesh { server, shape }
    }

    /// Run the refinement to completion. Returns the finished iteration
    /// buffer, or `None` if a checkpoint asked to stop.
    pub fn run(mut self, checkpoint: &mut dyn Checkpoint) -> Option<Grid<u32>> {
        self.refine(BASE_STEP * 4, checkpoint)?;
        self.refine(BASE_STEP, checkpoint)?;

        tracing::debug!("mesh passes done; computing remainder");
        self.server.request_incomplete();
        self.server.serve(checkpoint)?;
        Some(self.server.iteration_snapshot())
    }

    fn refine(&mut self, step: usize, checkpoint: &mut dyn Checkpoint) -> Option<()> {
        tracing::debug!(step, "mesh pass");
        self.server.grid_lines_request(step);
        self.server.serve(checkpoint)?;
        self.fill_uniform_boxes(step);
        Some(())
    }

    /// Partition the frame into `step`-sized boxes anchored on the sampled
    /// grid lines and stamp the interior of each box whose four edges and
    /// far corner all carry one value.
    fn fill_uniform_boxes(&mut self, step: usize) {
        let Size { x: width, y: height } = self.shape;
        if width <= step || height <= step {
            return;
        }

        // Edge-segment uniformity, precomputed per sampled line. A vertical
        // segment covers rows r*step..(r+1)*step at column c*step (top pixel
        // excluded; the cross edges and corner close the perimeter).
        let v_cols = (width - 1) / step + 1;
        let v_rows = height / step;
        let h_cols = width / step;
        let h_rows = (height - 1) / step + 1;

        let iteration = self.server.iteration();
        let mut v_same = Grid::new(Size { x: v_cols, y: v_rows }, false);
        for col in 0..v_cols {
            let x = col * step;
            for row in 0..v_rows {
                let value = iteration[(x, row * step)];
                v_same[(col, row)] =
                    (row * step..(row + 1) * step).all(|y| iteration[(x, y)] == value);
            }
        }
        let mut h_same = Grid::new(Size { x: h_cols, y: h_rows }, false);
        for row in 0..h_rows {
            let y = row * step;
            for col in 0..h_cols {
                let value = iteration[(col * step, y)];
                h_same[(col, row)] =
                    (col * step..(col + 1) * step).all(|x| iteration[(x, y)] == value);
            }
        }

        let box_rows = h_rows - 1;
        let box_cols = v_cols - 1;
        let mut filled = 0usize;
        for row in 0..box_rows {
            for col in 0..box_cols {
                if !(v_same[(col, row)]
                    && v_same[(col + 1, row)]
                    && h_same[(col, row)]
                    && h_same[(col, row + 1)])
                {
                    continue;
                }
                let value = self.server.iteration()[(col * step, row * step)];
                let right = self.server.iteration()[((col + 1) * step, row * step)];
                let top = self.server.iteration()[(col * step, (row + 1) * step)];
                let corner = self.server.iteration()[((col + 1) * step, (row + 1) * step)];
                if right == value && top == value && corner == value {
                    self.server.fill_box_request(
                        PixelPoint {
                            x: col * step + 1,
                            y: row * step + 1,
                        },
                        PixelPoint {
                            x: (col + 1) * step - 1,
                            y: (row + 1) * step - 1,
                        },
                        value,
                        None,
                    );
                    filled += 1;
                }
            }
        }
        tracing::debug!(step, filled, "uniform boxes stamped");
    }
}

/// The trivial algorithm: request every pixel and serve once. Kept as the
/// correctness reference for the mesh and for benchmarking its savings.
pub struct RequestAll<'a> {
    server: &'a mut PixelServer,
}

impl<'a> RequestAll<'a> {
    pub fn new(server: &'a mut PixelServer) -> Self {
        RequestAll { server }
    }

    pub fn run(self, checkpoint: &mut dyn Checkpoint) -> Option<Grid<u32>> {
        let shape = self.server.shape();
        self.server.box_request(
            PixelPoint { x: 0, y: 0 },
            PixelPoint {
                x: shape.x - 1,
                y: shape.y - 1,
            },
            None,
            None,
        );
        self.server.serve(checkpoint)?;
        Some(self.server.iteration_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ComputeContext;
    use crate::evaluator::ScalarEvaluator;
    use crate::mandel::Mandel;
    use crate::Control;
    use num::complex::Complex64;
    use std::sync::Arc;

    fn ctx() -> ComputeContext {
        // Early stopping off so the mesh and the exhaustive reference see
        // identical per-batch semantics.
        ComputeContext::with_evaluator(Arc::new(ScalarEvaluator)).early_stopping(false)
    }

    fn keep_going() -> impl FnMut(f64) -> Control {
        |_| Control::Continue
    }

    fn mesh_equals_exhaustive(view: &Mandel) {
        let ctx = ctx();
        let mut mesh_server = PixelServer::new(&ctx, view, None);
        let meshed = Mesh::new(&mut mesh_server).run(&mut keep_going()).unwrap();

        let mut full_server = PixelServer::new(&ctx, view, None);
        let full = RequestAll::new(&mut full_server)
            .run(&mut keep_going())
            .unwrap();

        assert_eq!(meshed, full);
        assert!(mesh_server.complete());
    }

    #[test]
    fn interior_view_matches_exhaustive() {
        // Entirely inside the main cardioid: one big uniform region.
        let view = Mandel::new(
            Complex64::new(-0.5, 0.0),
            Size { x: 130, y: 90 },
            0.05,
            0.0,
            100,
        )
        .unwrap();
        mesh_equals_exhaustive(&view);
    }

    #[test]
    fn exterior_view_matches_exhaustive() {
        // Far outside the set: wide smooth escape bands.
        let view = Mandel::new(
            Complex64::new(1.2, 1.2),
            Size { x: 120, y: 84 },
            0.8,
            0.0,
            100,
        )
        .unwrap();
        mesh_equals_exhaustive(&view);
    }

    #[test]
    fn boundary_view_completes_with_exact_samples() {
        // Spans the cardioid edge: a mix of uniform and detailed boxes.
        let view = Mandel::new(
            Complex64::new(-0.1, 0.9),
            Size { x: 100, y: 100 },
            0.5,
            0.0,
            60,
        )
        .unwrap();
        let ctx = ctx();
        let mut mesh_server = PixelServer::new(&ctx, &view, None);
        let meshed = Mesh::new(&mut mesh_server).run(&mut keep_going()).unwrap();
        assert!(mesh_server.complete());
        assert!(meshed.as_slice().iter().all(|&v| v <= 60));

        let mut full_server = PixelServer::new(&ctx, &view, None);
        let full = RequestAll::new(&mut full_server)
            .run(&mut keep_going())
            .unwrap();

        // First-pass sampling lines are computed before any stamping, so
        // they are pixel-exact however detailed the view is.
        for y in 0..100 {
            for x in 0..100 {
                if x % 56 == 0 || y % 56 == 0 {
                    assert_eq!(meshed[(x, y)], full[(x, y)], "({}, {})", x, y);
                }
            }
        }
    }

    #[test]
    fn grid_smaller_than_mesh_step_still_completes() {
        let view = Mandel::new(
            Complex64::new(-0.5, 0.0),
            Size { x: 10, y: 10 },
            0.01,
            0.0,
            40,
        )
        .unwrap();
        mesh_equals_exhaustive(&view);
    }

    #[test]
    fn all_interior_cells_reach_the_cap() {
        let ctx = ctx();
        let view = Mandel::new(
            Complex64::new(-0.5, 0.0),
            Size { x: 70, y: 70 },
            0.01,
            0.0,
            50,
        )
        .unwrap();
        let mut server = PixelServer::new(&ctx, &view, None);
        let result = Mesh::new(&mut server).run(&mut keep_going()).unwrap();
        assert!(result.as_slice().iter().all(|&v| v == 50));
    }

    #[test]
    fn stop_request_unwinds_the_run() {
        let ctx = ctx();
        let view = Mandel::new(
            Complex64::new(-0.5, 0.0),
            Size { x: 70, y: 70 },
            0.05,
            0.0,
            100,
        )
        .unwrap();
        let mut server = PixelServer::new(&ctx, &view, None);
        let result = Mesh::new(&mut server).run(&mut |_: f64| Control::Stop);
        assert!(result.is_none());
    }
}
