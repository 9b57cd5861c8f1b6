//! The Mandel view entity: the description of one view of the fractal plane,
//! and (once a job completes) its resulting iteration buffer and statistics.

use num::complex::Complex64;

use crate::grid::Grid;
use crate::{Error, PixelDelta, Size};

/// One view of the fractal plane, and the result of computing it.
///
/// Geometry is centre + pitch + rotation: `size` spans the smaller screen
/// dimension, and `size_per_gap` is the derived per-pixel pitch (one fewer
/// gap than pixels, so 4 pixels spanning `size` sit at 0, 1/3, 2/3, 1).
/// The `iteration` buffer is `None` until a job fills it in.
#[derive(Clone, Debug)]
pub struct Mandel {
    pub centre: Complex64,
    pub shape: Size,
    pub size: f64,
    pub size_per_gap: f64,
    pub theta_degrees: f64,
    pub max_iterations: u32,
    /// Heuristic from the previous view, used to budget expected work.
    pub expected_iterations_per_pixel: f64,
    pub has_border: bool,
    /// Pan that produced this view, if any. Only affects work estimation;
    /// the carry-over offset is supplied separately to the server.
    pub pan: Option<PixelDelta>,

    // Results, filled in when a compute job completes.
    pub iteration: Option<Grid<u32>>,
    pub max_iteration: u32,
    pub iterations_performed: u64,
    pub iterations_per_pixel: f64,
    /// Iteration count the driver last stopped at; reused as the
    /// early-stopping ceiling when extending this view with a border.
    pub final_iteration: u32,
}

impl Mandel {
    pub fn new(
        centre: Complex64,
        shape: Size,
        size: f64,
        theta_degrees: f64,
        max_iterations: u32,
    ) -> Result<Self, Error> {
        if shape.x < 2 || shape.y < 2 {
            return Err(Error::Configuration(format!(
                "view must be at least 2x2 pixels, got {}x{}",
                shape.x, shape.y
            )));
        }
        let gaps = if shape.y <= shape.x {
            shape.y - 1
        } else {
            shape.x - 1
        };
        Ok(Mandel {
            centre,
            shape,
            size,
            size_per_gap: size / gaps as f64,
            theta_degrees,
            max_iterations,
            expected_iterations_per_pixel: 0.0,
            has_border: false,
            pan: None,
            iteration: None,
            max_iteration: 0,
            iterations_performed: 0,
            iterations_per_pixel: 0.0,
            final_iteration: 0,
        })
    }

    pub fn x_size(&self) -> f64 {
        self.size_per_gap * (self.shape.x - 1) as f64
    }

    pub fn y_size(&self) -> f64 {
        self.size_per_gap * (self.shape.y - 1) as f64
    }

    pub fn theta_radians(&self) -> f64 {
        self.theta_degrees.to_radians()
    }

    /// Unit vector along the view's x axis in the complex plane.
    pub fn x_unit(&self) -> Complex64 {
        let t = self.theta_radians();
        Complex64::new(t.cos(), t.sin())
    }

    /// Unit vector along the view's y axis in the complex plane.
    pub fn y_unit(&self) -> Complex64 {
        let t = self.theta_radians();
        Complex64::new(-t.sin(), t.cos())
    }

    /// The per-pixel input constants for this view, bottom-left origin.
    pub fn complex_grid(&self) -> Grid<Complex64> {
        let x_unit = self.x_unit();
        let y_unit = self.y_unit();
        let x0 = -self.x_size() / 2.0;
        let y0 = -self.y_size() / 2.0;
        let mut grid = Grid::new(self.shape, Complex64::new(0.0, 0.0));
        for y in 0..self.shape.y {
            let dy = y0 + y as f64 * self.size_per_gap;
            for x in 0..self.shape.x {
                let dx = x0 + x as f64 * self.size_per_gap;
                grid[(x, y)] = self.centre + x_unit * dx + y_unit * dy;
            }
        }
        grid
    }

    /// Map a (possibly fractional) pixel position within a frame of the given
    /// shape back to its complex value. Used by outer layers to anchor zoom
    /// and pan gestures.
    pub fn complex_at_frame_point(&self, frame_shape: Size, frame_point: (f64, f64)) -> Complex64 {
        let x_pixels_from_centre = frame_point.0 - 0.5 * (frame_shape.x - 1) as f64;
        let y_pixels_from_centre = frame_point.1 - 0.5 * (frame_shape.y - 1) as f64;
        let x_dist = x_pixels_from_centre * self.size_per_gap;
        let y_dist = y_pixels_from_centre * self.size_per_gap;
        self.centre + self.x_unit() * x_dist + self.y_unit() * y_dist
    }

    /// Number of pixels a job for this view is expected to actually compute.
    ///
    /// A panned view reuses the overlap with its predecessor, so only the
    /// newly exposed L-shaped strip counts toward expected work.
    pub fn new_pixel_count(&self) -> usize {
        match self.pan {
            None => self.shape.x * self.shape.y,
            Some(pan) => {
                let abs_x = (pan.x.unsigned_abs() as usize).min(self.shape.x);
                let abs_y = (pan.y.unsigned_abs() as usize).min(self.shape.y);
                abs_x * (self.shape.y - abs_y) + abs_y * (self.shape.x - abs_x) + abs_x * abs_y
            }
        }
    }
}
