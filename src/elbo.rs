//! Evidence lower bound for the current variational state.

use ndarray::Array2;
use statrs::function::erf::erfc;
use statrs::function::gamma::ln_gamma;

use crate::priors::Priors;
use crate::state::{FactorParams, VbState};
use crate::updates::exp_square_diff;

pub(crate) const LN_2PI: f64 = 1.8378770664093453;

/// Negative variational entropy terms of one truncated-Normal block, as
/// they enter the bound: -1/2 sum log tau + (n/2) log 2pi
/// + sum log survival(-mu sqrt(tau)) + sum tau/2 (var + (exp - mu)^2).
fn truncated_normal_entropy(params: &FactorParams) -> f64 {
    let n = params.mu.len() as f64;
    let log_tau: f64 = params.tau.iter().map(|&t| t.ln()).sum();
    let log_survival: f64 = params
        .mu
        .iter()
        .zip(params.tau.iter())
        .map(|(&mu, &tau)| (0.5 * erfc(-mu * tau.sqrt() / std::f64::consts::SQRT_2)).ln())
        .sum();
    let quad: f64 = params
        .tau
        .iter()
        .zip(params.var.iter())
        .zip(params.exp.iter().zip(params.mu.iter()))
        .map(|((&tau, &var), (&exp, &mu))| tau / 2.0 * (var + (exp - mu) * (exp - mu)))
        .sum();
    -0.5 * log_tau + n / 2.0 * LN_2PI + log_survival + quad
}

/// Exponential-prior cross-entropy of one block: sum log lambda
/// - sum lambda E[value].
fn exponential_prior_term(lambda: &Array2<f64>, exp: &Array2<f64>) -> f64 {
    lambda.mapv(f64::ln).sum() - (lambda * exp).sum()
}

/// The variational objective maximised by the coordinate-ascent sweeps.
/// Diagnostic only: it is not used as a stopping criterion.
pub(crate) fn elbo(
    r: &Array2<f64>,
    m: &Array2<f64>,
    priors: &Priors,
    size_omega: f64,
    st: &VbState,
) -> f64 {
    let likelihood = size_omega / 2.0 * (st.explog_tau - LN_2PI)
        - st.exp_tau / 2.0 * exp_square_diff(r, m, st);

    let factor_priors = exponential_prior_term(&priors.lambda_f, &st.f.exp)
        + exponential_prior_term(&priors.lambda_s, &st.s.exp)
        + exponential_prior_term(&priors.lambda_g, &st.g.exp);

    let tau_prior = priors.alpha * priors.beta.ln() - ln_gamma(priors.alpha)
        + (priors.alpha - 1.0) * st.explog_tau
        - priors.beta * st.exp_tau;

    let tau_entropy = -st.alpha_s * st.beta_s.ln() + ln_gamma(st.alpha_s)
        - (st.alpha_s - 1.0) * st.explog_tau
        + st.beta_s * st.exp_tau;

    likelihood + factor_priors + tau_prior + tau_entropy
        + truncated_normal_entropy(&st.f)
        + truncated_normal_entropy(&st.s)
        + truncated_normal_entropy(&st.g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FactorParams;
    use ndarray::{array, Array2};

    fn tiny_state() -> VbState {
        let mut f = FactorParams::new(Array2::ones((2, 1)), Array2::ones((2, 1)));
        let mut s = FactorParams::new(Array2::ones((1, 1)), Array2::ones((1, 1)));
        let mut g = FactorParams::new(Array2::ones((2, 1)), Array2::ones((2, 1)));
        f.refresh_column(0);
        s.refresh_entry(0, 0);
        g.refresh_column(0);
        let mut st = VbState::new(f, s, g);
        st.alpha_s = 3.0;
        st.beta_s = 2.0;
        st.refresh_tau_moments();
        st
    }

    #[test]
    fn test_elbo_is_finite() {
        let st = tiny_state();
        let r = array![[1.0, 2.0], [3.0, 4.0]];
        let m = Array2::ones((2, 2));
        let priors = crate::priors::Priors::constant(1.0, 1.0, 1.0, 2, 2, 1, 1);
        let value = elbo(&r, &m, &priors, 4.0, &st);
        assert!(value.is_finite(), "elbo {}", value);
    }

    #[test]
    fn test_gamma_block_vanishes_when_posterior_equals_prior() {
        // With alpha_s = alpha and beta_s = beta, the Gamma cross-entropy
        // and variational entropy cancel exactly.
        let mut st = tiny_state();
        st.alpha_s = 1.5;
        st.beta_s = 0.5;
        st.refresh_tau_moments();

        let tau_prior = 1.5 * 0.5f64.ln() - ln_gamma(1.5) + (1.5 - 1.0) * st.explog_tau
            - 0.5 * st.exp_tau;
        let tau_entropy = -1.5 * 0.5f64.ln() + ln_gamma(1.5) - (1.5 - 1.0) * st.explog_tau
            + 0.5 * st.exp_tau;
        assert!((tau_prior + tau_entropy).abs() < 1e-12);
    }

    #[test]
    fn test_exponential_prior_term() {
        let lambda = array![[2.0, 1.0]];
        let exp = array![[0.5, 3.0]];
        let expected = 2.0f64.ln() + 1.0f64.ln() - (2.0 * 0.5 + 1.0 * 3.0);
        assert!((exponential_prior_term(&lambda, &exp) - expected).abs() < 1e-12);
    }
}
