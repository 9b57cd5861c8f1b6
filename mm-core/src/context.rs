//! Backend selection and shared compute tuning.
//!
//! The one place that decides which [`PixelEvaluator`] implementation the
//! rest of the engine uses. Everything downstream of here is written against
//! the trait and never branches on backend identity.

use std::sync::Arc;

use crate::evaluator::{LaneEvaluator, PixelEvaluator, ScalarEvaluator};

const DEFAULT_ITERATIONS_PER_LOOP: u32 = 1000;
const DEFAULT_EARLY_STOP_TOLERANCE: f64 = 0.00001;

/// Shared compute configuration, passed by reference to whichever component
/// needs it rather than held as process-wide state.
pub struct ComputeContext {
    evaluator: Arc<dyn PixelEvaluator>,
    /// Whether drained batches may be cut short of the iteration cap.
    pub early_stopping: bool,
    /// Iteration chunk size between cancellation checkpoints.
    pub iterations_per_loop: u32,
    /// Fraction of the batch that may escape in a chunk while still counting
    /// the batch as drained.
    pub early_stop_tolerance: f64,
}

impl ComputeContext {
    /// Probe the host and pick a backend: the lane-parallel evaluator when
    /// there is more than one core to feed, the serial one otherwise.
    pub fn auto() -> Self {
        let cores = num_cpus::get();
        let evaluator: Arc<dyn PixelEvaluator> = if cores > 1 {
            tracing::info!(cores, "selected lane-parallel evaluator");
            Arc::new(LaneEvaluator::new())
        } else {
            tracing::info!("single core; selected scalar evaluator");
            Arc::new(ScalarEvaluator)
        };
        Self::with_evaluator(evaluator)
    }

    pub fn with_evaluator(evaluator: Arc<dyn PixelEvaluator>) -> Self {
        ComputeContext {
            evaluator,
            early_stopping: true,
            iterations_per_loop: DEFAULT_ITERATIONS_PER_LOOP,
            early_stop_tolerance: DEFAULT_EARLY_STOP_TOLERANCE,
        }
    }

    pub fn evaluator(&self) -> Arc<dyn PixelEvaluator> {
        Arc::clone(&self.evaluator)
    }

    pub fn early_stopping(mut self, enabled: bool) -> Self {
        self.early_stopping = enabled;
        self
    }

    pub fn iterations_per_loop(mut self, iterations: u32) -> Self {
        assert!(iterations > 0, "chunk size must be positive");
        self.iterations_per_loop = iterations;
        self
    }
}
