use crate::worker::JobContext;

/// How a job's run ended, from the job's own point of view.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    /// The job observed a stop request at a checkpoint and unwound.
    Stopped,
    Failed(mm_core::Error),
}

/// A unit of schedulable work.
///
/// Jobs run on the scheduler's worker thread and are expected to call
/// [`JobContext::checkpoint`] regularly; that is the only point where
/// progress is published, newly arrived commands are handled, and stop
/// requests are observed. A job that never checkpoints cannot be stopped.
pub trait Job: Send + Sized + 'static {
    fn run(&mut self, cx: &mut JobContext<'_, Self>) -> Outcome;
}
