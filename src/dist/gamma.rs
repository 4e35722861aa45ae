//! Moments of a Gamma distribution with shape/rate parameterisation.

use statrs::function::gamma::digamma;

/// E[tau] for tau ~ Gamma(shape, rate).
pub fn expectation(shape: f64, rate: f64) -> f64 {
    shape / rate
}

/// E[log tau] for tau ~ Gamma(shape, rate).
pub fn expectation_log(shape: f64, rate: f64) -> f64 {
    digamma(shape) - rate.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expectation() {
        assert_eq!(expectation(2.0, 4.0), 0.5);
        assert_eq!(expectation(3.0, 1.0), 3.0);
    }

    #[test]
    fn test_expectation_log() {
        // digamma(1) = -gamma (Euler-Mascheroni)
        let euler_gamma = 0.5772156649015329;
        assert!((expectation_log(1.0, 1.0) + euler_gamma).abs() < 1e-10);
        // digamma(2) = 1 - gamma; rate contributes -ln(rate)
        let expected = 1.0 - euler_gamma - 2.0f64.ln();
        assert!((expectation_log(2.0, 2.0) - expected).abs() < 1e-10);
    }
}
