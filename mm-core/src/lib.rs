//! Compute engine for Mandel Mesh: escape-time iteration over large pixel
//! grids, served incrementally with adaptive early stopping and cooperative
//! cancellation.
//!
//! The pipeline is layered bottom-up: [`evaluator::PixelEvaluator`] advances
//! batches of points through the `z := z^2 + c` recurrence,
//! [`driver::ComputeDriver`] runs it in shrinking chunks,
//! [`server::PixelServer`] owns the per-calculation buffers and deduplicates
//! region requests, and [`mesh::Mesh`] decides which pixels are worth
//! computing at all.

use std::fmt;

pub mod context;
pub mod driver;
pub mod evaluator;
pub mod grid;
pub mod mandel;
pub mod mesh;
pub mod progress;
pub mod server;

/// A pair of integer (x, y) dimensions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Size {
    pub x: usize,
    pub y: usize,
}

/// A pixel coordinate. The origin is the bottom-left of the frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelPoint {
    pub x: usize,
    pub y: usize,
}

/// A signed pixel offset between two frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelDelta {
    pub x: i64,
    pub y: i64,
}

/// Answer from a [`Checkpoint`]: keep going, or unwind cooperatively.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Cooperative suspension point threaded through the compute pipeline.
///
/// The driver reports the quantity of iteration work performed after each
/// chunk; the implementation may translate that into user-visible progress,
/// and may answer [`Control::Stop`] to request an unwind. Stops are only
/// observed at these chunk boundaries, never mid-chunk, so a `Stop` answer
/// takes effect within one chunk's worth of latency.
pub trait Checkpoint {
    fn report(&mut self, work: f64) -> Control;
}

impl<F> Checkpoint for F
where
    F: FnMut(f64) -> Control,
{
    fn report(&mut self, work: f64) -> Control {
        self(work)
    }
}

/// Errors that can occur in the engine.
///
/// Cancellation is deliberately not represented here: cancellable stages
/// return `Option` instead, with `None` meaning the job was stopped.
#[derive(Clone, Debug)]
pub enum Error {
    /// A component was used before its prerequisites were in place.
    Configuration(String),
    InvalidArgument(String),
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
