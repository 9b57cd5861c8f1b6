//! The calculation job: one [`Mandel`] view computed end to end.

use std::sync::Arc;

use mm_core::context::ComputeContext;
use mm_core::mandel::Mandel;
use mm_core::mesh::Mesh;
use mm_core::progress::{Mode, ProgressEstimator};
use mm_core::server::PixelServer;
use mm_core::{Checkpoint, Control, PixelDelta};

use crate::job::{Job, Outcome};
use crate::worker::JobContext;

/// Fraction of the progress bar covered by server construction; the mesh
/// phase takes the rest on a work basis.
const SETUP_PROGRESS: f64 = 0.05;

/// Compute one view of the fractal plane.
///
/// The job owns its view for the duration of the run; on completion the
/// scheduler hands the job back through [`SchedulerEvent::Complete`] and
/// the filled-in view is recovered with [`MandelJob::into_mandel`].
///
/// [`SchedulerEvent::Complete`]: crate::SchedulerEvent::Complete
pub struct MandelJob {
    ctx: Arc<ComputeContext>,
    mandel: Mandel,
    prev: Option<(Mandel, PixelDelta)>,
    estimator: ProgressEstimator,
}

impl MandelJob {
    pub fn new(ctx: Arc<ComputeContext>, mandel: Mandel) -> Self {
        MandelJob {
            ctx,
            mandel,
            prev: None,
            estimator: ProgressEstimator::new(),
        }
    }

    /// A job whose view overlaps `prev` by a pixel offset; the overlap is
    /// carried over instead of recomputed.
    pub fn with_carry_over(
        ctx: Arc<ComputeContext>,
        mandel: Mandel,
        prev: Mandel,
        offset: PixelDelta,
    ) -> Self {
        MandelJob {
            ctx,
            mandel,
            prev: Some((prev, offset)),
            estimator: ProgressEstimator::new(),
        }
    }

    pub fn mandel(&self) -> &Mandel {
        &self.mandel
    }

    pub fn into_mandel(self) -> Mandel {
        self.mandel
    }

    fn build_server(&self) -> Result<PixelServer, mm_core::Error> {
        // A border extension must visually match the already-displayed
        // image, so it replays the previous run's stopping point instead of
        // finding its own.
        let early_stopping_iteration = match &self.prev {
            Some((prev, _)) if self.mandel.has_border && prev.final_iteration > 0 => {
                Some(prev.final_iteration)
            }
            _ => None,
        };
        match &self.prev {
            Some((prev, offset)) => PixelServer::with_carry_over(
                &self.ctx,
                &self.mandel,
                early_stopping_iteration,
                prev,
                *offset,
            ),
            None => Ok(PixelServer::new(
                &self.ctx,
                &self.mandel,
                early_stopping_iteration,
            )),
        }
    }

    fn expected_work(&self) -> f64 {
        self.mandel.expected_iterations_per_pixel.max(1.0) * self.mandel.new_pixel_count() as f64
    }
}

/// Adapts the compute pipeline's work reports to scheduler checkpoints.
struct EstimatingCheckpoint<'a, 'b, J: Job> {
    estimator: &'a mut ProgressEstimator,
    cx: &'a mut JobContext<'b, J>,
}

impl<J: Job> Checkpoint for EstimatingCheckpoint<'_, '_, J> {
    fn report(&mut self, work: f64) -> Control {
        let progress = self.estimator.estimate_progress(work);
        self.cx.checkpoint(progress)
    }
}

impl Job for MandelJob {
    fn run(&mut self, cx: &mut JobContext<'_, Self>) -> Outcome {
        tracing::info!(
            centre = %self.mandel.centre,
            size = self.mandel.size,
            max_iterations = self.mandel.max_iterations,
            "starting calculation"
        );
        self.estimator.start();

        self.estimator.set_progress_range(SETUP_PROGRESS, Mode::Range);
        let mut server = match self.build_server() {
            Ok(server) => server,
            Err(error) => return Outcome::Failed(error),
        };
        let progress = self.estimator.estimate_progress(1.0);
        if cx.checkpoint(progress) == Control::Stop {
            return Outcome::Stopped;
        }

        self.estimator.set_expected_work(self.expected_work());
        self.estimator.set_progress_range(1.0, Mode::Work);
        let result = {
            let mut checkpoint = EstimatingCheckpoint {
                estimator: &mut self.estimator,
                cx,
            };
            Mesh::new(&mut server).run(&mut checkpoint)
        };
        let Some(iteration) = result else {
            return Outcome::Stopped;
        };
        self.estimator.finish();

        let pixels = iteration.len();
        let total: u64 = iteration.as_slice().iter().map(|&k| u64::from(k)).sum();
        self.mandel.max_iteration = iteration.as_slice().iter().copied().max().unwrap_or(0);
        self.mandel.iterations_performed = self.estimator.cumulative_work() as u64;
        self.mandel.iterations_per_pixel = total as f64 / pixels as f64;
        self.mandel.final_iteration = server.final_iteration();
        self.mandel.iteration = Some(iteration);
        tracing::info!(
            iterations_per_pixel = self.mandel.iterations_per_pixel,
            final_iteration = self.mandel.final_iteration,
            "calculation complete"
        );
        Outcome::Completed
    }
}
