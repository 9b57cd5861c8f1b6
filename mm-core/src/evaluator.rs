//! Escape-time evaluation of point batches.
//!
//! An evaluator advances every not-yet-escaped cell of a batch through the
//! quadratic recurrence `z := z^2 + c` until the cell escapes
//! (`|z|^2 >= 4.0`, inclusive) or its iteration count reaches `end_iter`.
//! State lives in the caller's buffers, so the same batch can be advanced
//! repeatedly with increasing `end_iter` without losing anything.

use num::complex::Complex64;
use rayon::prelude::*;

/// Width of one dispatch lane for the parallel evaluator. Batches are padded
/// to a multiple of this before being split across the pool.
pub const LANE_WIDTH: usize = 64;

/// A backend that advances escape-time iteration on a flat batch of points.
///
/// Contract: for each cell `i`, apply the recurrence step by step from
/// `iteration[i]` until either `|z[i]|^2 >= 4.0` (set `escaped[i]`, stop
/// mutating the cell) or `iteration[i] == end_iter`. Escape takes priority
/// when both happen on the same step, so `escaped` is the sole authority on
/// whether a cell is still continuing; `iteration == end_iter` alone is
/// ambiguous and never used for that.
pub trait PixelEvaluator: Send + Sync {
    fn compute_iterations(
        &self,
        c: &[Complex64],
        z: &mut [Complex64],
        iteration: &mut [u32],
        escaped: &mut [bool],
        start_iter: u32,
        end_iter: u32,
    );
}

/// Advance one lane of cells. Shared by both evaluator implementations.
fn advance_lane(
    c: &[Complex64],
    z: &mut [Complex64],
    iteration: &mut [u32],
    escaped: &mut [bool],
    end_iter: u32,
) {
    for i in 0..c.len() {
        if escaped[i] {
            continue;
        }
        let (cx, cy) = (c[i].re, c[i].im);
        let (mut x, mut y) = (z[i].re, z[i].im);
        let mut k = iteration[i];
        let mut xx = x * x;
        let mut yy = y * y;
        loop {
            if xx + yy >= 4.0 {
                escaped[i] = true;
                break;
            }
            if k == end_iter {
                break;
            }
            y = 2.0 * x * y + cy;
            x = xx - yy + cx;
            k += 1;
            xx = x * x;
            yy = y * y;
        }
        z[i] = Complex64::new(x, y);
        iteration[i] = k;
    }
}

/// Serial evaluator: one thread, exact-sized batches. The fallback when no
/// parallel hardware is worth dispatching to, and the reference the parallel
/// path is tested against.
#[derive(Default)]
pub struct ScalarEvaluator;

impl PixelEvaluator for ScalarEvaluator {
    fn compute_iterations(
        &self,
        c: &[Complex64],
        z: &mut [Complex64],
        iteration: &mut [u32],
        escaped: &mut [bool],
        start_iter: u32,
        end_iter: u32,
    ) {
        debug_assert!(iteration
            .iter()
            .zip(escaped.iter())
            .all(|(&k, &esc)| esc || (k >= start_iter && k <= end_iter)));
        advance_lane(c, z, iteration, escaped, end_iter);
    }
}

/// Parallel evaluator: splits the batch into fixed-width lanes and runs them
/// on the rayon pool.
///
/// The batch is padded up to a lane multiple so every dispatch sees full
/// lanes; padding cells are born escaped, cost nothing, and are truncated
/// away before results are copied back.
pub struct LaneEvaluator {
    lane_width: usize,
}

impl Default for LaneEvaluator {
    fn default() -> Self {
        LaneEvaluator {
            lane_width: LANE_WIDTH,
        }
    }
}

impl LaneEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_lane_width(lane_width: usize) -> Self {
        LaneEvaluator { lane_width }
    }
}

impl PixelEvaluator for LaneEvaluator {
    fn compute_iterations(
        &self,
        c: &[Complex64],
        z: &mut [Complex64],
        iteration: &mut [u32],
        escaped: &mut [bool],
        start_iter: u32,
        end_iter: u32,
    ) {
        let n = c.len();
        if n == 0 {
            return;
        }
        let w = self.lane_width;
        let padded = ((n + w - 1) / w) * w;

        let mut pc = c.to_vec();
        pc.resize(padded, Complex64::new(1.0, 0.0));
        let mut pz = z.to_vec();
        pz.resize(padded, Complex64::new(1.0, 0.0));
        let mut pit = iteration.to_vec();
        pit.resize(padded, start_iter);
        let mut pesc = escaped.to_vec();
        pesc.resize(padded, true);

        (
            pc.par_chunks(w),
            pz.par_chunks_mut(w),
            pit.par_chunks_mut(w),
            pesc.par_chunks_mut(w),
        )
            .into_par_iter()
            .for_each(|(lc, lz, lit, lesc)| advance_lane(lc, lz, lit, lesc, end_iter));

        z.copy_from_slice(&pz[..n]);
        iteration.copy_from_slice(&pit[..n]);
        escaped.copy_from_slice(&pesc[..n]);
    }
}
