//! Job scheduler for Mandel Mesh.
//!
//! Calculations are long-running and must stay responsive to the caller:
//! a pan should preempt a zoom that is still rendering, and a shutdown
//! request should drain everything. To support this, jobs run on a
//! dedicated worker thread, commands and events travel over channels, and
//! the running job cooperates by checkpointing.

use std::sync::mpsc::{self, Receiver, Sender};

mod job;
mod mandel_job;
mod worker;

pub use job::{Job, Outcome};
pub use mandel_job::MandelJob;
pub use worker::{JobContext, QueueAs, SchedulerEvent};

use worker::Command;

/// Errors that can occur during scheduling.
#[derive(Clone, Debug)]
pub enum Error {
    Internal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Caller-side handle to the worker thread.
///
/// The worker is free-running: it shuts down when the last `Scheduler`
/// handle (and with it the command channel) is dropped.
pub struct Scheduler<J: Job> {
    commands: Sender<Command<J>>,
    events: Receiver<SchedulerEvent<J>>,
}

impl<J: Job> Scheduler<J> {
    pub fn new() -> Result<Self, Error> {
        let (commands, command_receiver) = mpsc::channel();
        let (event_sender, events) = mpsc::channel();
        std::thread::Builder::new()
            .name("mm-sched-worker".to_string())
            .spawn(move || worker::worker_loop(command_receiver, event_sender))
            .map_err(|err| Error::Internal(format!("error starting worker thread: {}", err)))?;
        Ok(Scheduler { commands, events })
    }

    pub fn request_job(&self, job: J, queue_as: QueueAs) -> Result<(), Error> {
        self.commands
            .send(Command::Job(job, queue_as))
            .map_err(|_| Error::Internal("scheduler worker has terminated".to_string()))
    }

    /// Ask the worker to drop queued jobs and stop running ones. A
    /// [`SchedulerEvent::StopSuccess`] is published once everything has
    /// drained.
    pub fn request_stop(&self) -> Result<(), Error> {
        self.commands
            .send(Command::Stop)
            .map_err(|_| Error::Internal("scheduler worker has terminated".to_string()))
    }

    pub fn events(&self) -> &Receiver<SchedulerEvent<J>> {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::Control;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// A job driven from the test thread: it announces itself on `started`,
    /// then performs one checkpoint per message received on `gate`. Jobs
    /// without channels just checkpoint through their steps.
    struct TestJob {
        label: &'static str,
        steps: usize,
        started: Option<mpsc::Sender<&'static str>>,
        gate: Option<mpsc::Receiver<()>>,
    }

    impl TestJob {
        fn plain(label: &'static str) -> Self {
            TestJob {
                label,
                steps: 3,
                started: None,
                gate: None,
            }
        }

        fn gated(
            label: &'static str,
            steps: usize,
        ) -> (Self, mpsc::Receiver<&'static str>, mpsc::Sender<()>) {
            let (started_tx, started_rx) = mpsc::channel();
            let (gate_tx, gate_rx) = mpsc::channel();
            let job = TestJob {
                label,
                steps,
                started: Some(started_tx),
                gate: Some(gate_rx),
            };
            (job, started_rx, gate_tx)
        }
    }

    impl Job for TestJob {
        fn run(&mut self, cx: &mut JobContext<'_, Self>) -> Outcome {
            if let Some(started) = &self.started {
                let _ = started.send(self.label);
            }
            for step in 0..self.steps {
                if let Some(gate) = &self.gate {
                    if gate.recv().is_err() {
                        return Outcome::Failed(mm_core::Error::Internal(
                            "test gate closed".to_string(),
                        ));
                    }
                }
                let progress = (step + 1) as f64 / self.steps as f64;
                if cx.checkpoint(progress) == Control::Stop {
                    return Outcome::Stopped;
                }
            }
            Outcome::Completed
        }
    }

    /// Collect completion labels until `count` jobs have completed.
    fn completions(scheduler: &Scheduler<TestJob>, count: usize) -> Vec<&'static str> {
        let mut labels = Vec::new();
        while labels.len() < count {
            match scheduler.events().recv_timeout(TIMEOUT).unwrap() {
                SchedulerEvent::Complete { job, .. } => labels.push(job.label),
                SchedulerEvent::Failed { error, .. } => panic!("job failed: {}", error),
                _ => {}
            }
        }
        labels
    }

    #[test]
    fn enqueued_jobs_complete_in_order() {
        let scheduler = Scheduler::new().unwrap();
        for label in ["a", "b", "c"] {
            scheduler
                .request_job(TestJob::plain(label), QueueAs::Enqueue)
                .unwrap();
        }
        assert_eq!(completions(&scheduler, 3), vec!["a", "b", "c"]);
    }

    #[test]
    fn expedited_job_preempts_the_queue() {
        let scheduler = Scheduler::new().unwrap();
        let (job_a, started, gate) = TestJob::gated("a", 1);
        scheduler.request_job(job_a, QueueAs::Enqueue).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        // While "a" sits before its checkpoint, queue "b" normally and
        // expedite "c". The checkpoint runs "c" inline, then "a" finishes,
        // then "b" runs from the queue.
        scheduler
            .request_job(TestJob::plain("b"), QueueAs::Enqueue)
            .unwrap();
        scheduler
            .request_job(TestJob::plain("c"), QueueAs::Expedite)
            .unwrap();
        gate.send(()).unwrap();

        assert_eq!(completions(&scheduler, 3), vec!["c", "a", "b"]);
    }

    #[test]
    fn singular_job_stops_the_running_one() {
        let scheduler = Scheduler::new().unwrap();
        let (job_a, started, gate) = TestJob::gated("a", 100);
        scheduler.request_job(job_a, QueueAs::Enqueue).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        scheduler
            .request_job(TestJob::plain("d"), QueueAs::Singular)
            .unwrap();
        gate.send(()).unwrap();

        // "a" observes its stop flag at the gated checkpoint and never
        // completes; only the singular job does.
        assert_eq!(completions(&scheduler, 1), vec!["d"]);
    }

    #[test]
    fn stop_on_idle_scheduler_succeeds_immediately() {
        let scheduler: Scheduler<TestJob> = Scheduler::new().unwrap();
        scheduler.request_stop().unwrap();
        match scheduler.events().recv_timeout(TIMEOUT).unwrap() {
            SchedulerEvent::StopSuccess => {}
            _ => panic!("expected StopSuccess"),
        }
    }

    #[test]
    fn stop_drains_a_running_job() {
        let scheduler = Scheduler::new().unwrap();
        let (job_a, started, gate) = TestJob::gated("a", 100);
        scheduler.request_job(job_a, QueueAs::Enqueue).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        scheduler.request_stop().unwrap();
        gate.send(()).unwrap();

        loop {
            match scheduler.events().recv_timeout(TIMEOUT).unwrap() {
                SchedulerEvent::StopSuccess => break,
                SchedulerEvent::Complete { .. } => panic!("stopped job must not complete"),
                _ => {}
            }
        }
    }

    #[test]
    fn new_job_cancels_a_pending_stop() {
        let scheduler = Scheduler::new().unwrap();
        let (job_a, started, gate) = TestJob::gated("a", 100);
        scheduler.request_job(job_a, QueueAs::Enqueue).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        // Stop while "a" runs, then resume work before the drain finishes.
        scheduler.request_stop().unwrap();
        scheduler
            .request_job(TestJob::plain("b"), QueueAs::Enqueue)
            .unwrap();
        gate.send(()).unwrap();

        // "a" unwinds at its checkpoint and "b" runs. The superseded stop
        // must not report success once work has resumed.
        let mut saw_b = false;
        loop {
            match scheduler.events().recv_timeout(TIMEOUT).unwrap() {
                SchedulerEvent::Complete { job, .. } => {
                    assert_eq!(job.label, "b");
                    saw_b = true;
                }
                SchedulerEvent::StopSuccess => {
                    panic!("stop reported success after a new job was requested")
                }
                SchedulerEvent::ActiveChange(false) if saw_b => break,
                _ => {}
            }
        }
    }

    #[test]
    fn progress_and_active_edges_are_published() {
        let scheduler = Scheduler::new().unwrap();
        scheduler
            .request_job(TestJob::plain("a"), QueueAs::Enqueue)
            .unwrap();

        let mut active_edges = Vec::new();
        let mut progress = Vec::new();
        loop {
            match scheduler.events().recv_timeout(TIMEOUT).unwrap() {
                SchedulerEvent::ActiveChange(active) => {
                    active_edges.push(active);
                    if !active {
                        break;
                    }
                }
                SchedulerEvent::Progress { progress: p, .. } => progress.push(p),
                _ => {}
            }
        }
        assert_eq!(active_edges, vec![true, false]);
        assert_eq!(progress.len(), 3);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }
}
