//! Progress estimation across heterogeneous job phases.
//!
//! Work totals for an escape-time image cannot be known up front, so the
//! estimator turns accumulated work against an a-priori guess into a bounded
//! progress fraction. Callers slice the overall progress bar into ranges and
//! hand each phase its own slice.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Yielded values are already fractions in [0, 1]; pass them through.
    Plain,
    /// Like `Plain`, but mapped into the active range.
    Range,
    /// Yielded values are raw work units, compared against the expected
    /// total and damped near the top.
    Work,
}

/// Where the linear work estimate hands over to the saturating tail.
const WORK_CUTOFF: f64 = 0.8;

pub struct ProgressEstimator {
    mode: Mode,
    expected_work: f64,
    cumulative_work: f64,
    range_from: f64,
    range_to: f64,
    progress: f64,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        ProgressEstimator {
            mode: Mode::Plain,
            expected_work: 0.0,
            cumulative_work: 0.0,
            range_from: 0.0,
            range_to: 1.0,
            progress: 0.0,
        }
    }

    pub fn start(&mut self) {
        self.mode = Mode::Plain;
        self.expected_work = 0.0;
        self.cumulative_work = 0.0;
        self.range_from = 0.0;
        self.range_to = 1.0;
        self.progress = 0.0;
    }

    pub fn finish(&mut self) {
        self.progress = 1.0;
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn cumulative_work(&self) -> f64 {
        self.cumulative_work
    }

    pub fn set_expected_work(&mut self, expected: f64) {
        self.expected_work = expected.max(1.0);
        self.cumulative_work = 0.0;
    }

    /// Begin a new phase whose progress occupies [current, `to`] of the bar.
    pub fn set_progress_range(&mut self, to: f64, mode: Mode) {
        debug_assert!(to >= self.progress && to <= 1.0);
        self.range_from = self.progress;
        self.range_to = to;
        self.mode = mode;
    }

    /// Fold a yielded amount into the estimate and return the overall
    /// progress fraction. Never moves backwards.
    pub fn estimate_progress(&mut self, yielded: f64) -> f64 {
        let proportion = match self.mode {
            Mode::Plain => {
                self.progress = self.progress.max(yielded.clamp(0.0, 1.0));
                return self.progress;
            }
            Mode::Range => yielded.clamp(0.0, 1.0),
            Mode::Work => {
                self.cumulative_work += yielded;
                let ratio = self.cumulative_work / self.expected_work;
                if ratio <= WORK_CUTOFF {
                    ratio
                } else {
                    // Saturating tail: approaches but never reaches 1.0
                    // when the expected total was an underestimate.
                    WORK_CUTOFF + (1.0 - WORK_CUTOFF) * (ratio - WORK_CUTOFF).tanh()
                }
            }
        };
        let mapped = self.range_from + (self.range_to - self.range_from) * proportion;
        self.progress = self.progress.max(mapped.min(self.range_to));
        self.progress
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}
