//! Iteration buffer to image rendering.

use mm_core::grid::Grid;

/// Settings for rendering an iteration buffer into an image.
#[derive(Default)]
pub struct Renderer {}

impl Renderer {
    /// Render escape counts into an image.
    ///
    /// Cells that reached `max_iterations` are treated as inside the set and
    /// rendered black; everything else gets a hue scaled across the range of
    /// escape counts actually present. Row 0 of the buffer is the bottom of
    /// the image.
    pub fn render(
        &self,
        iteration: &Grid<u32>,
        max_iterations: u32,
    ) -> Result<image::DynamicImage, String> {
        let shape = iteration.shape();
        if iteration.len() != shape.x * shape.y {
            return Err(format!(
                "error: data size != width * height: {} != {} * {}",
                iteration.len(),
                shape.x,
                shape.y
            ));
        }

        // Find min/max escaping counts, so we can compute hue in that scale.
        let (min, max) = iteration
            .as_slice()
            .iter()
            .filter(|&&count| count < max_iterations)
            .fold((u32::MAX, u32::MIN), |(min, max), &count| {
                (std::cmp::min(count, min), std::cmp::max(count, max))
            });

        let mut img = image::ImageBuffer::<image::Rgb<u8>, _>::new(shape.x as u32, shape.y as u32);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let count = iteration[(x as usize, shape.y - 1 - y as usize)];
            *pixel = if count >= max_iterations {
                image::Rgb([0, 0, 0])
            } else {
                escape_to_rgb(min, max, count)
            };
        }
        Ok(img.into())
    }
}

/// Convert a value within a range to an RGB value.
fn escape_to_rgb(min: u32, max: u32, value: u32) -> image::Rgb<u8> {
    let denom = std::cmp::max(max - min, 1) as f64;
    // H in range [0, 360)
    let hue = (value - min) as f64 * 359.0 / denom;
    let (r, g, b) = hsv::hsv_to_rgb(hue, 1.0, 1.0);
    image::Rgb([r, g, b])
}
