//! Chunked, adaptive batch computation.
//!
//! The driver runs the evaluator in fixed-size iteration chunks, physically
//! compacting the working set after each chunk so the cost per chunk shrinks
//! as pixels escape. Between chunks it reports work done to a [`Checkpoint`],
//! which is also where cooperative cancellation is observed.

use std::sync::Arc;

use num::complex::Complex64;

use crate::context::ComputeContext;
use crate::evaluator::PixelEvaluator;
use crate::{Checkpoint, Control};

pub struct ComputeDriver {
    evaluator: Arc<dyn PixelEvaluator>,
    max_iterations: u32,
    iterations_per_loop: u32,
    early_stopping: bool,
    early_stop_tolerance: f64,
    final_iteration: u32,
}

impl ComputeDriver {
    pub fn new(ctx: &ComputeContext, max_iterations: u32) -> Self {
        ComputeDriver {
            evaluator: ctx.evaluator(),
            max_iterations,
            iterations_per_loop: ctx.iterations_per_loop,
            early_stopping: ctx.early_stopping,
            early_stop_tolerance: ctx.early_stop_tolerance,
            final_iteration: 0,
        }
    }

    /// The iteration count the last batch stopped at. Reused as the
    /// early-stopping ceiling when a border extension must visually match an
    /// already-displayed image.
    pub fn final_iteration(&self) -> u32 {
        self.final_iteration
    }

    /// Compute escape iterations for a flat batch of input constants.
    ///
    /// `early_stopping_iteration` replays a previously found cutoff: once the
    /// chunk boundary reaches it, all surviving cells are treated as
    /// non-escaping. Without it, the batch stops early once a chunk retires
    /// no more than the tolerance's worth of pixels (and at least one pixel
    /// has retired overall).
    ///
    /// Returns `None` if the checkpoint asked to stop; partial results are
    /// abandoned.
    pub fn compute_flat_array(
        &mut self,
        c: &[Complex64],
        early_stopping_iteration: Option<u32>,
        checkpoint: &mut dyn Checkpoint,
    ) -> Option<Vec<u32>> {
        let total = c.len();
        let mut result = vec![0u32; total];
        if total == 0 || self.max_iterations == 0 {
            self.final_iteration = 0;
            return Some(result);
        }
        let pixel_tolerance = (self.early_stop_tolerance * total as f64).floor() as usize;

        // First chunk runs the full batch.
        let mut z: Vec<Complex64> = c.to_vec();
        let mut iteration = vec![0u32; total];
        let mut escaped = vec![false; total];
        let mut start_iter = 0u32;
        let mut end_iter = self.iterations_per_loop.min(self.max_iterations);
        self.evaluator
            .compute_iterations(c, &mut z, &mut iteration, &mut escaped, start_iter, end_iter);
        if checkpoint.report(work_done(&iteration, start_iter)) == Control::Stop {
            return None;
        }

        if end_iter == self.max_iterations || escaped.iter().all(|&e| e) {
            result.copy_from_slice(&iteration);
            self.final_iteration = end_iter;
            return Some(result);
        }

        // Compact the continuing cells into a dense working set.
        let mut cont_idx: Vec<usize> = Vec::new();
        let mut cont_c: Vec<Complex64> = Vec::new();
        let mut cont_z: Vec<Complex64> = Vec::new();
        let mut cont_iter: Vec<u32> = Vec::new();
        for i in 0..total {
            if escaped[i] {
                result[i] = iteration[i];
            } else {
                cont_idx.push(i);
                cont_c.push(c[i]);
                cont_z.push(z[i]);
                cont_iter.push(iteration[i]);
            }
        }

        loop {
            start_iter = end_iter;
            end_iter = (start_iter + self.iterations_per_loop).min(self.max_iterations);
            let mut esc = vec![false; cont_idx.len()];
            self.evaluator.compute_iterations(
                &cont_c,
                &mut cont_z,
                &mut cont_iter,
                &mut esc,
                start_iter,
                end_iter,
            );
            if checkpoint.report(work_done(&cont_iter, start_iter)) == Control::Stop {
                return None;
            }

            // Retire escaped cells into the result, compact the rest in place.
            let before = cont_idx.len();
            let mut w = 0usize;
            for r in 0..before {
                if esc[r] {
                    result[cont_idx[r]] = cont_iter[r];
                } else {
                    cont_idx[w] = cont_idx[r];
                    cont_c[w] = cont_c[r];
                    cont_z[w] = cont_z[r];
                    cont_iter[w] = cont_iter[r];
                    w += 1;
                }
            }
            cont_idx.truncate(w);
            cont_c.truncate(w);
            cont_z.truncate(w);
            cont_iter.truncate(w);
            let still_continuing = w;
            let stopped = before - w;

            if still_continuing == 0 {
                break;
            }
            if end_iter == self.max_iterations {
                for r in 0..still_continuing {
                    result[cont_idx[r]] = cont_iter[r];
                }
                break;
            }

            if self.early_stopping {
                let ceiling_hit =
                    early_stopping_iteration.map_or(false, |ceiling| end_iter >= ceiling);
                let drained = early_stopping_iteration.is_none()
                    && stopped <= pixel_tolerance
                    && still_continuing < total;
                if ceiling_hit || drained {
                    for r in 0..still_continuing {
                        result[cont_idx[r]] = self.max_iterations;
                    }
                    break;
                }
            }
        }

        self.final_iteration = end_iter;
        tracing::debug!(
            pixels = total,
            final_iteration = self.final_iteration,
            "batch complete"
        );
        Some(result)
    }
}

/// Iteration work performed by the chunk that just ran: the sum of each
/// active cell's advance past `start_iter`.
fn work_done(iteration: &[u32], start_iter: u32) -> f64 {
    iteration
        .iter()
        .map(|&k| u64::from(k) - u64::from(start_iter))
        .sum::<u64>() as f64
}
