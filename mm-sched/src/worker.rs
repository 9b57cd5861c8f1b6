//! The worker-thread side of the scheduler.
//!
//! A single free-running thread owns the kanban state: a `to_do` queue of
//! submitted jobs and a `doing` stack of stop flags for the jobs currently
//! on the call stack. The stack can be more than one deep because an
//! expedited job runs nested inside the checkpoint of the job it preempts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use mm_core::Control;

use crate::job::{Job, Outcome};

/// How a submitted job should be queued.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueAs {
    /// Run after everything already queued.
    Enqueue,
    /// Run at the next checkpoint of the current job, before returning to
    /// it. Degrades to `Enqueue` when nothing is running.
    Expedite,
    /// Drop the queue, flag every running job to stop, then run alone.
    Singular,
}

pub(crate) enum Command<J> {
    Job(J, QueueAs),
    Stop,
}

/// Notifications the worker publishes back to the caller.
pub enum SchedulerEvent<J> {
    /// A running job published a progress fraction in [0, 1].
    Progress { job_number: u64, progress: f64 },
    /// The job ran to completion; its result travels back inside it.
    Complete { job_number: u64, job: J },
    Failed { job_number: u64, error: mm_core::Error },
    /// Edge-triggered: the worker went from idle to busy or back.
    ActiveChange(bool),
    /// A stop request has fully drained both queues.
    StopSuccess,
}

struct WorkerState<J: Job> {
    commands: Receiver<Command<J>>,
    events: Sender<SchedulerEvent<J>>,
    to_do: VecDeque<(u64, J)>,
    doing: Vec<Arc<AtomicBool>>,
    next_number: u64,
    stopping: bool,
    active: bool,
}

/// Handle a running job holds on its scheduler.
pub struct JobContext<'a, J: Job> {
    state: &'a mut WorkerState<J>,
    stop: Arc<AtomicBool>,
    number: u64,
}

impl<J: Job> JobContext<'_, J> {
    pub fn job_number(&self) -> u64 {
        self.number
    }

    /// Publish progress, let newly arrived commands act (an expedited job
    /// runs to completion inside this call), and learn whether this job has
    /// been asked to stop.
    pub fn checkpoint(&mut self, progress: f64) -> Control {
        let _ = self.state.events.send(SchedulerEvent::Progress {
            job_number: self.number,
            progress,
        });
        while let Ok(command) = self.state.commands.try_recv() {
            self.state.handle_command(command);
        }
        if self.stop.load(Ordering::Relaxed) {
            Control::Stop
        } else {
            Control::Continue
        }
    }
}

pub(crate) fn worker_loop<J: Job>(
    commands: Receiver<Command<J>>,
    events: Sender<SchedulerEvent<J>>,
) {
    let span = tracing::info_span!("scheduler worker");
    let _guard = span.enter();

    let mut state = WorkerState {
        commands,
        events,
        to_do: VecDeque::new(),
        doing: Vec::new(),
        next_number: 0,
        stopping: false,
        active: false,
    };
    loop {
        let command = match state.commands.recv() {
            Ok(command) => command,
            // Every scheduler handle is gone; shut down.
            Err(_) => return,
        };
        state.handle_command(command);
        loop {
            while let Ok(command) = state.commands.try_recv() {
                state.handle_command(command);
            }
            let Some((number, job)) = state.to_do.pop_front() else {
                break;
            };
            state.run_job(number, job);
        }
        state.finish_cycle();
    }
}

impl<J: Job> WorkerState<J> {
    fn handle_command(&mut self, command: Command<J>) {
        // A new job supersedes any stop still draining; the pending
        // StopSuccess notification is cancelled rather than delivered after
        // work has resumed.
        if matches!(command, Command::Job(..)) {
            self.stopping = false;
        }
        match command {
            Command::Job(job, QueueAs::Enqueue) => {
                let number = self.assign_number();
                self.to_do.push_back((number, job));
            }
            Command::Job(job, QueueAs::Expedite) => {
                let number = self.assign_number();
                if self.doing.is_empty() {
                    self.to_do.push_back((number, job));
                } else {
                    self.run_job(number, job);
                }
            }
            Command::Job(job, QueueAs::Singular) => {
                self.to_do.clear();
                self.stop_all();
                let number = self.assign_number();
                self.to_do.push_back((number, job));
            }
            Command::Stop => {
                self.to_do.clear();
                self.stop_all();
                if self.doing.is_empty() {
                    let _ = self.events.send(SchedulerEvent::StopSuccess);
                } else {
                    self.stopping = true;
                }
            }
        }
    }

    fn assign_number(&mut self) -> u64 {
        let number = self.next_number;
        self.next_number += 1;
        number
    }

    fn stop_all(&mut self) {
        for flag in &self.doing {
            flag.store(true, Ordering::Relaxed);
        }
    }

    fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            let _ = self.events.send(SchedulerEvent::ActiveChange(active));
        }
    }

    fn run_job(&mut self, number: u64, mut job: J) {
        tracing::debug!(number, "job started");
        self.set_active(true);
        let stop = Arc::new(AtomicBool::new(false));
        self.doing.push(Arc::clone(&stop));
        let outcome = {
            let mut cx = JobContext {
                state: self,
                stop: Arc::clone(&stop),
                number,
            };
            job.run(&mut cx)
        };
        self.doing.pop();
        match outcome {
            Outcome::Completed => {
                // A stop that raced with completion wins; the result is
                // dropped rather than published after StopSuccess.
                if stop.load(Ordering::Relaxed) {
                    tracing::debug!(number, "job finished after stop request, result dropped");
                } else {
                    let _ = self.events.send(SchedulerEvent::Complete {
                        job_number: number,
                        job,
                    });
                }
            }
            Outcome::Stopped => {
                tracing::debug!(number, "job stopped");
            }
            Outcome::Failed(error) => {
                tracing::error!(number, %error, "job failed");
                let _ = self.events.send(SchedulerEvent::Failed {
                    job_number: number,
                    error,
                });
            }
        }
    }

    fn finish_cycle(&mut self) {
        if self.stopping && self.to_do.is_empty() && self.doing.is_empty() {
            self.stopping = false;
            let _ = self.events.send(SchedulerEvent::StopSuccess);
        }
        self.set_active(false);
    }
}
