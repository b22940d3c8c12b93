//! Floating point comparisons built on the `approx` crate.

use approx::AbsDiffEq;

/// Tolerance used when checking that normalized weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// True if the values sum to one within `WEIGHT_TOLERANCE`.
#[must_use]
pub fn sums_to_one(values: impl IntoIterator<Item = f64>) -> bool {
    almost_eq(values.into_iter().sum(), 1.0, WEIGHT_TOLERANCE)
}
