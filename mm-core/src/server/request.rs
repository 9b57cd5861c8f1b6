//! Transient per-serve-cycle region requests.

use crate::grid::Grid;
use crate::PixelPoint;

pub type SameValueFn = Box<dyn FnOnce(u32)>;
pub type CompletedFn = Box<dyn FnOnce()>;

/// A rectangular region (inclusive bounds) awaiting its callbacks.
///
/// Requests know nothing of complex numbers; they are created, resolved
/// against the iteration buffer at the end of a serve cycle, and discarded.
pub struct PixelRequest {
    bottom_left: PixelPoint,
    top_right: PixelPoint,
    same_value: Option<SameValueFn>,
    completed: Option<CompletedFn>,
}

impl PixelRequest {
    pub(crate) fn new(
        bottom_left: PixelPoint,
        top_right: PixelPoint,
        same_value: Option<SameValueFn>,
        completed: Option<CompletedFn>,
    ) -> Self {
        PixelRequest {
            bottom_left,
            top_right,
            same_value,
            completed,
        }
    }

    /// Fire callbacks against the served buffer: `same_value` only if every
    /// cell of the region agrees, `completed` unconditionally.
    pub(crate) fn respond(self, iteration: &Grid<u32>) {
        if let Some(callback) = self.same_value {
            if let Some(value) = iteration.uniform_value(self.bottom_left, self.top_right) {
                callback(value);
            }
        }
        if let Some(callback) = self.completed {
            callback();
        }
    }
}
