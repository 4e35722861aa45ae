//! Mutable variational state shared by the update equations.

use ndarray::Array2;

use crate::dist::{gamma, truncated_normal};

/// Natural parameters and moments of one factor matrix.
///
/// Each entry has a truncated-Normal posterior with location `mu` and
/// precision `tau`; `exp` and `var` are its first two central moments.
/// Any mutation of `mu`/`tau` must be followed by a refresh of the
/// corresponding `exp`/`var` entries before they are read again.
#[derive(Debug, Clone)]
pub(crate) struct FactorParams {
    pub mu: Array2<f64>,
    pub tau: Array2<f64>,
    pub exp: Array2<f64>,
    pub var: Array2<f64>,
}

impl FactorParams {
    pub(crate) fn new(mu: Array2<f64>, tau: Array2<f64>) -> Self {
        let dim = mu.dim();
        Self {
            mu,
            tau,
            exp: Array2::zeros(dim),
            var: Array2::zeros(dim),
        }
    }

    /// Recompute the moments of column `k` from its natural parameters.
    pub(crate) fn refresh_column(&mut self, k: usize) {
        let (exp, var) =
            truncated_normal::column_moments(self.mu.column(k), self.tau.column(k));
        self.exp.column_mut(k).assign(&exp);
        self.var.column_mut(k).assign(&var);
    }

    /// Recompute the moments of a single entry.
    pub(crate) fn refresh_entry(&mut self, k: usize, l: usize) {
        let mu = self.mu[[k, l]];
        let tau = self.tau[[k, l]];
        self.exp[[k, l]] = truncated_normal::expectation(mu, tau);
        self.var[[k, l]] = truncated_normal::variance(mu, tau);
    }

    /// Elementwise second moment `var + exp^2`.
    pub(crate) fn second_moment(&self) -> Array2<f64> {
        &self.var + &self.exp.mapv(|v| v * v)
    }
}

/// The full variational state: three factor blocks plus the Gamma
/// posterior over the noise precision.
#[derive(Debug, Clone)]
pub(crate) struct VbState {
    pub f: FactorParams,
    pub s: FactorParams,
    pub g: FactorParams,
    pub alpha_s: f64,
    pub beta_s: f64,
    pub exp_tau: f64,
    pub explog_tau: f64,
}

impl VbState {
    pub(crate) fn new(f: FactorParams, s: FactorParams, g: FactorParams) -> Self {
        Self {
            f,
            s,
            g,
            alpha_s: 0.0,
            beta_s: 0.0,
            exp_tau: 0.0,
            explog_tau: 0.0,
        }
    }

    /// Point-estimate reconstruction expF . expS . expG^T.
    pub(crate) fn reconstruction(&self) -> Array2<f64> {
        self.f.exp.dot(&self.s.exp).dot(&self.g.exp.t())
    }

    /// Refresh E[tau] and E[log tau] from the current alpha_s, beta_s.
    pub(crate) fn refresh_tau_moments(&mut self) {
        self.exp_tau = gamma::expectation(self.alpha_s, self.beta_s);
        self.explog_tau = gamma::expectation_log(self.alpha_s, self.beta_s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_refresh_keeps_moments_consistent() {
        let mu = array![[1.0, -1000.0], [0.0, 2.0]];
        let tau = Array2::ones((2, 2));
        let mut params = FactorParams::new(mu, tau);
        params.refresh_column(0);
        params.refresh_column(1);

        assert!((params.exp[[0, 0]] - truncated_normal::expectation(1.0, 1.0)).abs() < 1e-15);
        // Deep-tail entry takes the Exponential limit.
        assert!((params.exp[[0, 1]] - 0.001).abs() < 1e-15);
        assert!(params.var.iter().all(|&v| v >= 0.0));

        params.mu[[0, 0]] = 3.0;
        params.refresh_entry(0, 0);
        assert!((params.exp[[0, 0]] - truncated_normal::expectation(3.0, 1.0)).abs() < 1e-15);
    }

    #[test]
    fn test_second_moment() {
        let mu = array![[0.5]];
        let tau = array![[2.0]];
        let mut params = FactorParams::new(mu, tau);
        params.refresh_column(0);
        let m2 = params.second_moment();
        let expected = params.var[[0, 0]] + params.exp[[0, 0]] * params.exp[[0, 0]];
        assert!((m2[[0, 0]] - expected).abs() < 1e-15);
    }

    #[test]
    fn test_reconstruction_shape() {
        let f = FactorParams::new(Array2::ones((4, 2)), Array2::ones((4, 2)));
        let s = FactorParams::new(Array2::ones((2, 3)), Array2::ones((2, 3)));
        let g = FactorParams::new(Array2::ones((5, 3)), Array2::ones((5, 3)));
        let state = VbState::new(f, s, g);
        assert_eq!(state.reconstruction().dim(), (4, 5));
    }

    #[test]
    fn test_tau_moments() {
        let f = FactorParams::new(Array2::ones((1, 1)), Array2::ones((1, 1)));
        let s = FactorParams::new(Array2::ones((1, 1)), Array2::ones((1, 1)));
        let g = FactorParams::new(Array2::ones((1, 1)), Array2::ones((1, 1)));
        let mut state = VbState::new(f, s, g);
        state.alpha_s = 3.0;
        state.beta_s = 2.0;
        state.refresh_tau_moments();
        assert_eq!(state.exp_tau, 1.5);
        assert!((state.explog_tau - gamma::expectation_log(3.0, 2.0)).abs() < 1e-15);
    }
}
