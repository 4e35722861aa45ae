//! Moments and draws for a Normal distribution truncated to `[0, inf)`.
//!
//! With location `mu` and precision `tau` (sigma = 1/sqrt(tau)), write
//! `x = -mu/sigma`. The survival function `1 - cdf(x)` is evaluated as
//! `0.5 * erfc(x / sqrt(2))`: for x > 8 the naive `1 - cdf(x)` rounds to
//! zero while erfc still carries the mass of the tail.
//!
//! As mu goes far negative relative to sigma, the truncated Normal
//! approaches an Exponential distribution and the closed-form moment
//! expressions underflow. Past `|mu| > EXP_TAIL_RATIO * sigma` the
//! Exponential limit is used instead: expectation `1/(|mu| tau)` and
//! variance its square. Whatever survives either branch is clamped so a
//! negative, infinite or NaN moment becomes 0 rather than an error.

use ndarray::{Array1, ArrayView1, Zip};
use ndarray_rand::rand::Rng;
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;

/// Ratio of |mu| to sigma beyond which the Exponential limit replaces
/// the closed-form truncated-Normal moments. The erfc form breaks down
/// near 38 sigma; 30 leaves a safety margin.
pub const EXP_TAIL_RATIO: f64 = 30.0;

/// Standard Normal density.
fn std_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Survival function 1 - Phi(x), via the complementary error function.
fn survival(x: f64) -> f64 {
    0.5 * erfc(x / std::f64::consts::SQRT_2)
}

/// Replace a negative, infinite or NaN moment with 0.
fn clamp(v: f64) -> f64 {
    if v.is_finite() && v >= 0.0 {
        v
    } else {
        0.0
    }
}

/// E[x] for x ~ TN(mu, 1/tau) on `[0, inf)`, with the default tail ratio.
pub fn expectation(mu: f64, tau: f64) -> f64 {
    expectation_with_ratio(mu, tau, EXP_TAIL_RATIO)
}

/// E[x] with an explicit tail-substitution ratio.
pub fn expectation_with_ratio(mu: f64, tau: f64, ratio: f64) -> f64 {
    let sigma = 1.0 / tau.sqrt();
    let value = if mu < -ratio * sigma {
        1.0 / (mu.abs() * tau)
    } else {
        let x = -mu / sigma;
        mu + sigma * std_normal_pdf(x) / survival(x)
    };
    clamp(value)
}

/// Var[x] for x ~ TN(mu, 1/tau) on `[0, inf)`, with the default tail ratio.
pub fn variance(mu: f64, tau: f64) -> f64 {
    variance_with_ratio(mu, tau, EXP_TAIL_RATIO)
}

/// Var[x] with an explicit tail-substitution ratio.
pub fn variance_with_ratio(mu: f64, tau: f64, ratio: f64) -> f64 {
    let sigma = 1.0 / tau.sqrt();
    let value = if mu < -ratio * sigma {
        let exp = 1.0 / (mu.abs() * tau);
        exp * exp
    } else {
        let x = -mu / sigma;
        let hazard = std_normal_pdf(x) / survival(x);
        sigma * sigma * (1.0 - hazard * (hazard - x))
    };
    clamp(value)
}

/// Expectation and variance for a whole column of independent entries.
///
/// The entries are independent, so the map is evaluated in parallel.
pub fn column_moments(mu: ArrayView1<f64>, tau: ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
    let mut exp = Array1::zeros(mu.len());
    let mut var = Array1::zeros(mu.len());
    Zip::from(&mut exp)
        .and(&mut var)
        .and(mu)
        .and(tau)
        .par_for_each(|e, v, &m, &t| {
            *e = expectation(m, t);
            *v = variance(m, t);
        });
    (exp, var)
}

/// Draw from TN(mu, 1/tau) on `[0, inf)` by inverting the Normal CDF on
/// the truncated interval. A zero precision draws 0 by definition, and
/// any negative or non-finite draw is replaced with 0.
pub fn draw<R: Rng + ?Sized>(rng: &mut R, mu: f64, tau: f64) -> f64 {
    if tau == 0.0 {
        return 0.0;
    }
    let sigma = 1.0 / tau.sqrt();
    let value = match Normal::new(mu, sigma) {
        Ok(normal) => {
            let lower = normal.cdf(0.0);
            let u = lower + (1.0 - lower) * rng.gen::<f64>();
            normal.inverse_cdf(u)
        }
        Err(_) => 0.0,
    };
    clamp(value)
}
