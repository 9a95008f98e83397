//! Utility functions for the CHTM crate.
//!
//! Squashing functions and random number helpers shared by region
//! construction and the step/learn passes.

use rand::Rng;

/// Logistic sigmoid.
///
/// # Examples
///
/// ```
/// use chtm::utils::sigmoid;
///
/// assert_eq!(sigmoid(0.0), 0.5);
/// assert!(sigmoid(10.0) > 0.99);
/// assert!(sigmoid(-10.0) < 0.01);
/// ```
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Generate a random float uniformly in `[min, max)`.
///
/// A degenerate range (`min == max`) returns `min` without consuming
/// randomness, so constant initial weights can be configured.
///
/// # Examples
///
/// ```
/// use chtm::utils::rand_float;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let val = rand_float(-0.5, 0.5, &mut rng);
/// assert!(val >= -0.5 && val < 0.5);
///
/// assert_eq!(rand_float(0.25, 0.25, &mut rng), 0.25);
/// ```
#[inline]
pub fn rand_float<R: Rng>(min: f32, max: f32, rng: &mut R) -> f32 {
    if min >= max {
        min
    } else {
        rng.gen_range(min..max)
    }
}

/// Index of a 2D coordinate in a row-major lattice of the given width.
///
/// ```
/// use chtm::utils::flat_index;
///
/// assert_eq!(flat_index(1, 2, 4), 9);
/// ```
#[inline]
pub fn flat_index(x: usize, y: usize, width: usize) -> usize {
    x + y * width
}
