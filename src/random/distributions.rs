//! Sampling primitives used throughout the model.
//!
//! Every function takes the generator explicitly so that one seed reproduces a
//! whole run and replicates never share a stream. Poisson, exponential and gamma
//! draws delegate to `rand_distr`; the truncated Weibull and the binomial are
//! implemented here because the model depends on their exact behavior.

use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, Poisson};

/// A uniform draw on `[0, 1)`.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random::<f64>()
}

/// An exponential draw with the given mean. A non-positive mean is a zero delay.
pub fn exponential<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> f64 {
    if mean <= 0.0 {
        return 0.0;
    }
    Exp::new(1.0 / mean)
        .expect("exponential rate is positive and finite")
        .sample(rng)
}

/// A gamma draw parameterized by shape and scale (mean `shape * scale`).
///
/// # Panics
///
/// Panics if either parameter is not positive; parameters are validated when
/// they are loaded.
pub fn gamma<R: Rng + ?Sized>(rng: &mut R, shape: f64, scale: f64) -> f64 {
    Gamma::new(shape, scale)
        .expect("gamma shape and scale must be positive")
        .sample(rng)
}

/// A Poisson count with mean `lambda`. Returns zero for `lambda <= 0`.
pub fn poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u64 {
    if lambda <= 0.0 || !lambda.is_finite() {
        return 0;
    }
    let draw: f64 = Poisson::new(lambda)
        .expect("poisson mean is positive and finite")
        .sample(rng);
    // Poisson draws are integral-valued floats.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = draw as u64;
    count
}

/// A Weibull draw by inversion of the CDF `1 - exp(-(x / scale)^shape)`.
pub fn weibull<R: Rng + ?Sized>(rng: &mut R, shape: f64, scale: f64) -> f64 {
    // 1 - U lies in (0, 1], so the logarithm is finite.
    let u = 1.0 - uniform(rng);
    scale * (-u.ln()).powf(1.0 / shape)
}

/// A Weibull draw conditioned to lie in `[lo, hi)`.
///
/// Draws outside the interval are discarded and redrawn, never clamped.
///
/// # Panics
///
/// Panics if the interval is empty.
pub fn weibull_truncated<R: Rng + ?Sized>(
    rng: &mut R,
    shape: f64,
    scale: f64,
    lo: f64,
    hi: f64,
) -> f64 {
    assert!(lo < hi, "empty truncation interval [{lo}, {hi})");
    loop {
        let x = weibull(rng, shape, scale);
        if x >= lo && x < hi {
            return x;
        }
    }
}

/// A binomial draw `Bin(n, p)` in expected `O(np)` time.
///
/// Uses Devroye's geometric waiting-time method: successive gaps between
/// successes are `floor(ln(U) / ln(1 - p)) + 1`, and the count is the number of
/// successes whose position does not exceed `n`. For `p >= 0.5` the symmetric
/// identity `Bin(n, p) = n - Bin(n, 1 - p)` keeps the expected work small.
pub fn binomial<R: Rng + ?Sized>(rng: &mut R, n: u64, p: f64) -> u64 {
    if n == 0 || p <= 0.0 {
        return 0;
    }
    if p >= 1.0 {
        return n;
    }
    if p >= 0.5 {
        n - binomial_waiting_time(rng, n, 1.0 - p)
    } else {
        binomial_waiting_time(rng, n, p)
    }
}

#[allow(clippy::cast_precision_loss)]
fn binomial_waiting_time<R: Rng + ?Sized>(rng: &mut R, n: u64, p: f64) -> u64 {
    let log_q = (-p).ln_1p();
    // `p` too small to move `ln(1 - p)` off zero: the first gap is past any `n`.
    if log_q == 0.0 || !log_q.is_finite() {
        return 0;
    }
    let limit = n as f64;
    let mut position = 0.0;
    let mut successes = 0;
    loop {
        let u = 1.0 - uniform(rng);
        position += (u.ln() / log_q).floor() + 1.0;
        if position > limit {
            return successes;
        }
        successes += 1;
    }
}
