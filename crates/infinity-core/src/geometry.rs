//! Random triangle stimuli

use crate::config::{CanvasConfig, ExperimentConfig};
use crate::types::{Point, Triangle};
use rand::Rng;

/// Slope used when A and B share an x coordinate
pub const VERTICAL_SLOPE: f64 = 999_999_999.0;

/// Draws triangles inside the bordered canvas.
///
/// Point C is kept away from the line through A and B by a *vertical* offset
/// measured at C's x coordinate, not by the perpendicular distance. Changing
/// that would change the stimulus distribution across generations.
#[derive(Debug, Clone)]
pub struct TriangleGenerator {
    canvas: CanvasConfig,
    min_distance_b: f64,
    min_distance_c: f64,
}

impl TriangleGenerator {
    pub fn new(config: &ExperimentConfig) -> Self {
        Self {
            canvas: config.canvas,
            min_distance_b: config.min_distance_b,
            min_distance_c: config.min_distance_c,
        }
    }

    /// Both retry loops are unbounded; they terminate quickly as long as the
    /// canvas is much larger than the minimum distances.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Triangle {
        let a = self.random_point(rng);

        let mut b = self.random_point(rng);
        while a.distance(b) < self.min_distance_b {
            b = self.random_point(rng);
        }

        let mut c = self.random_point(rng);
        while vertical_offset(a, b, c) < self.min_distance_c {
            c.y = self.random_y(rng);
        }

        Triangle::new(a, b, c)
    }

    fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        Point::new(self.random_x(rng), self.random_y(rng))
    }

    fn random_x<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        rng.gen_range(self.canvas.border + 1..=self.canvas.width - self.canvas.border)
    }

    fn random_y<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        rng.gen_range(self.canvas.border + 1..=self.canvas.height - self.canvas.border)
    }
}

/// Slope and intercept of the line through `a` and `b`
pub fn line_through(a: Point, b: Point) -> (f64, f64) {
    let slope = if a.x == b.x {
        VERTICAL_SLOPE
    } else {
        f64::from(a.y - b.y) / f64::from(a.x - b.x)
    };
    let intercept = f64::from(a.y) - slope * f64::from(a.x);
    (slope, intercept)
}

/// Vertical distance from `c` to the A–B line evaluated at `c.x`
pub fn vertical_offset(a: Point, b: Point, c: Point) -> f64 {
    let (slope, intercept) = line_through(a, b);
    let y_avoid = intercept + f64::from(c.x) * slope;
    (f64::from(c.y) - y_avoid).abs()
}
