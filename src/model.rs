//! The variational Bayesian tri-factorisation model.
//!
//! Owns the data, the priors and the variational state, and drives the
//! coordinate-ascent sweeps: all S entries, then the noise precision,
//! then all F columns, the precision again, all G columns, and the
//! precision once more. One diagnostic record is appended per sweep.

use ndarray::Array2;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use serde::Serialize;

use crate::elbo::{self, LN_2PI};
use crate::error::VbNmtfError;
use crate::init::{draw_exponential, InitConfig, InitFg, InitS, KMeansInit, RowClusterer};
use crate::metrics::{self, Prediction};
use crate::priors::Priors;
use crate::state::{FactorParams, VbState};
use crate::updates;

/// Goodness-of-fit metrics for [`VbNmtf::quality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMetric {
    LogLikelihood,
    Bic,
    Aic,
    Mse,
}

/// Per-sweep convergence diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepRecord {
    pub iteration: usize,
    pub exp_tau: f64,
    pub elbo: f64,
    pub mse: f64,
    pub r_squared: f64,
    pub pearson: f64,
}

/// Variational Bayesian non-negative matrix tri-factorisation:
/// R ~ F . S . G^T with Exponential priors on the factor entries and a
/// Gamma prior on the observation-noise precision.
///
/// ```no_run
/// use ndarray::Array2;
/// use vb_nmtf::{InitConfig, Priors, VbNmtf};
///
/// let r = Array2::from_elem((6, 5), 1.0);
/// let mask = Array2::ones((6, 5));
/// let priors = Priors::constant(1.0, 1.0, 1.0, 6, 5, 2, 2);
/// let mut model = VbNmtf::new(r, mask, 2, 2, priors).unwrap();
/// model.train(&InitConfig::default(), 100).unwrap();
/// let performance = model.predict(&Array2::ones((6, 5))).unwrap();
/// println!("held-in MSE: {}", performance.mse);
/// ```
#[derive(Debug, Clone)]
pub struct VbNmtf {
    r: Array2<f64>,
    mask: Array2<f64>,
    n_rows: usize,
    n_cols: usize,
    k: usize,
    l: usize,
    size_omega: f64,
    priors: Priors,
    pub(crate) state: Option<VbState>,
    history: Vec<SweepRecord>,
}

impl VbNmtf {
    /// Validate shapes, ranks, priors and mask coverage, and build an
    /// uninitialised model.
    pub fn new(
        r: Array2<f64>,
        mask: Array2<f64>,
        k: usize,
        l: usize,
        priors: Priors,
    ) -> Result<Self, VbNmtfError> {
        if mask.dim() != r.dim() {
            return Err(VbNmtfError::ShapeMismatch {
                what: "M",
                expected: r.dim(),
                found: mask.dim(),
            });
        }
        if k == 0 {
            return Err(VbNmtfError::InvalidRank("K"));
        }
        if l == 0 {
            return Err(VbNmtfError::InvalidRank("L"));
        }
        let (n_rows, n_cols) = r.dim();
        priors.validate(n_rows, n_cols, k, l)?;

        for (i, row) in mask.rows().into_iter().enumerate() {
            if row.sum() == 0.0 {
                return Err(VbNmtfError::EmptyRow(i));
            }
        }
        for (j, column) in mask.columns().into_iter().enumerate() {
            if column.sum() == 0.0 {
                return Err(VbNmtfError::EmptyColumn(j));
            }
        }

        let size_omega = mask.sum();
        Ok(Self {
            r,
            mask,
            n_rows,
            n_cols,
            k,
            l,
            size_omega,
            priors,
            state: None,
            history: Vec::new(),
        })
    }

    /// (I, J) of the data matrix.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// (K, L): row- and column-cluster counts.
    pub fn ranks(&self) -> (usize, usize) {
        (self.k, self.l)
    }

    /// Per-sweep diagnostics, in sweep order, across all `run` calls.
    pub fn history(&self) -> &[SweepRecord] {
        &self.history
    }

    /// Posterior means of F, S and G, once initialised.
    pub fn expected_factors(&self) -> Option<(&Array2<f64>, &Array2<f64>, &Array2<f64>)> {
        self.state
            .as_ref()
            .map(|st| (&st.f.exp, &st.s.exp, &st.g.exp))
    }

    /// Point-estimate reconstruction expF . expS . expG^T.
    pub fn reconstruction(&self) -> Result<Array2<f64>, VbNmtfError> {
        let st = self.state.as_ref().ok_or(VbNmtfError::NotInitialised)?;
        Ok(st.reconstruction())
    }

    /// Set the natural parameters per `config` using the bundled k-means
    /// collaborator for [`InitFg::Kmeans`], then derive all moments.
    pub fn initialise(&mut self, config: &InitConfig) -> Result<(), VbNmtfError> {
        self.initialise_with(config, &KMeansInit::default())
    }

    /// As [`Self::initialise`], with an explicit clustering collaborator.
    pub fn initialise_with(
        &mut self,
        config: &InitConfig,
        clusterer: &dyn RowClusterer,
    ) -> Result<(), VbNmtfError> {
        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(42));

        let tau_f = self.initial_tau("tauF", &config.tau_f, (self.n_rows, self.k))?;
        let tau_s = self.initial_tau("tauS", &config.tau_s, (self.k, self.l))?;
        let tau_g = self.initial_tau("tauG", &config.tau_g, (self.n_cols, self.l))?;

        let mu_s = match config.init_s {
            InitS::Exp => self.priors.lambda_s.mapv(|rate| 1.0 / rate),
            InitS::Random => draw_exponential(&self.priors.lambda_s, "lambdaS", &mut rng)?,
        };

        let (mu_f, mu_g) = match config.init_fg {
            InitFg::Exp => (
                self.priors.lambda_f.mapv(|rate| 1.0 / rate),
                self.priors.lambda_g.mapv(|rate| 1.0 / rate),
            ),
            InitFg::Random => (
                draw_exponential(&self.priors.lambda_f, "lambdaF", &mut rng)?,
                draw_exponential(&self.priors.lambda_g, "lambdaG", &mut rng)?,
            ),
            InitFg::Kmeans => {
                let mu_f = clusterer.cluster(&self.r, &self.mask, self.k, &mut rng)?;
                let transposed_r = self.r.t().to_owned();
                let transposed_mask = self.mask.t().to_owned();
                let mu_g =
                    clusterer.cluster(&transposed_r, &transposed_mask, self.l, &mut rng)?;
                check_cluster_shape("muF", &mu_f, (self.n_rows, self.k))?;
                check_cluster_shape("muG", &mu_g, (self.n_cols, self.l))?;
                (mu_f, mu_g)
            }
        };

        let mut st = VbState::new(
            FactorParams::new(mu_f, tau_f),
            FactorParams::new(mu_s, tau_s),
            FactorParams::new(mu_g, tau_g),
        );
        for k in 0..self.k {
            st.f.refresh_column(k);
        }
        for k in 0..self.k {
            for l in 0..self.l {
                st.s.refresh_entry(k, l);
            }
        }
        for l in 0..self.l {
            st.g.refresh_column(l);
        }
        updates::update_tau(
            &self.r,
            &self.mask,
            self.priors.alpha,
            self.priors.beta,
            self.size_omega,
            &mut st,
        );
        st.refresh_tau_moments();

        self.state = Some(st);
        Ok(())
    }

    /// Run `iterations` coordinate-ascent sweeps. There is no automatic
    /// stopping rule; the caller owns the iteration budget.
    pub fn run(&mut self, iterations: usize) -> Result<(), VbNmtfError> {
        let st = self.state.as_mut().ok_or(VbNmtfError::NotInitialised)?;

        for _ in 0..iterations {
            for k in 0..self.k {
                for l in 0..self.l {
                    updates::update_s(&self.r, &self.mask, &self.priors.lambda_s, st, k, l);
                    st.s.refresh_entry(k, l);
                }
            }
            updates::update_tau(
                &self.r,
                &self.mask,
                self.priors.alpha,
                self.priors.beta,
                self.size_omega,
                st,
            );
            st.refresh_tau_moments();

            for k in 0..self.k {
                updates::update_f(&self.r, &self.mask, &self.priors.lambda_f, st, k);
                st.f.refresh_column(k);
            }
            updates::update_tau(
                &self.r,
                &self.mask,
                self.priors.alpha,
                self.priors.beta,
                self.size_omega,
                st,
            );
            st.refresh_tau_moments();

            for l in 0..self.l {
                updates::update_g(&self.r, &self.mask, &self.priors.lambda_g, st, l);
                st.g.refresh_column(l);
            }
            updates::update_tau(
                &self.r,
                &self.mask,
                self.priors.alpha,
                self.priors.beta,
                self.size_omega,
                st,
            );
            st.refresh_tau_moments();

            let reconstruction = st.reconstruction();
            let elbo = elbo::elbo(&self.r, &self.mask, &self.priors, self.size_omega, st);
            let mse = metrics::masked_mse(&self.mask, &self.r, &reconstruction);
            let r_squared = metrics::masked_r2(&self.mask, &self.r, &reconstruction);
            let pearson = metrics::masked_pearson(&self.mask, &self.r, &reconstruction);
            let iteration = self.history.len() + 1;

            log::info!(
                "Sweep {}. ELBO: {:.6}. MSE: {:.6}. R^2: {:.6}. Rp: {:.6}.",
                iteration,
                elbo,
                mse,
                r_squared,
                pearson
            );
            self.history.push(SweepRecord {
                iteration,
                exp_tau: st.exp_tau,
                elbo,
                mse,
                r_squared,
                pearson,
            });
        }
        Ok(())
    }

    /// Initialise and run, in one call.
    pub fn train(&mut self, config: &InitConfig, iterations: usize) -> Result<(), VbNmtfError> {
        self.initialise(config)?;
        self.run(iterations)
    }

    /// Reconstruct R and score it against the entries selected by
    /// `mask_pred` (typically a held-out test mask).
    pub fn predict(&self, mask_pred: &Array2<f64>) -> Result<Prediction, VbNmtfError> {
        let st = self.state.as_ref().ok_or(VbNmtfError::NotInitialised)?;
        if mask_pred.dim() != self.r.dim() {
            return Err(VbNmtfError::ShapeMismatch {
                what: "prediction mask",
                expected: self.r.dim(),
                found: mask_pred.dim(),
            });
        }
        let r_pred = st.reconstruction();
        Ok(Prediction {
            mse: metrics::masked_mse(mask_pred, &self.r, &r_pred),
            r_squared: metrics::masked_r2(mask_pred, &self.r, &r_pred),
            pearson: metrics::masked_pearson(mask_pred, &self.r, &r_pred),
        })
    }

    /// Log-likelihood of the observed data at the posterior means.
    pub fn log_likelihood(&self) -> Result<f64, VbNmtfError> {
        let st = self.state.as_ref().ok_or(VbNmtfError::NotInitialised)?;
        let residual = (&self.mask * &(&self.r - &st.reconstruction()).mapv(|v| v * v)).sum();
        Ok(self.size_omega / 2.0 * (st.explog_tau - LN_2PI) - st.exp_tau / 2.0 * residual)
    }

    /// Goodness of fit, penalised by model complexity where the metric
    /// calls for it. Larger is better for every metric except `Mse`.
    pub fn quality(&self, metric: QualityMetric) -> Result<f64, VbNmtfError> {
        let st = self.state.as_ref().ok_or(VbNmtfError::NotInitialised)?;
        let free_parameters =
            (self.n_rows * self.k + self.k * self.l + self.n_cols * self.l) as f64;
        match metric {
            QualityMetric::LogLikelihood => self.log_likelihood(),
            QualityMetric::Bic => {
                Ok(self.log_likelihood()? - 0.5 * free_parameters * self.size_omega.ln())
            }
            QualityMetric::Aic => Ok(self.log_likelihood()? - free_parameters),
            QualityMetric::Mse => Ok(metrics::masked_mse(
                &self.mask,
                &self.r,
                &st.reconstruction(),
            )),
        }
    }

    fn initial_tau(
        &self,
        what: &'static str,
        override_tau: &Option<Array2<f64>>,
        expected: (usize, usize),
    ) -> Result<Array2<f64>, VbNmtfError> {
        match override_tau {
            Some(tau) => {
                if tau.dim() != expected {
                    return Err(VbNmtfError::ShapeMismatch {
                        what,
                        expected,
                        found: tau.dim(),
                    });
                }
                Ok(tau.clone())
            }
            None => Ok(Array2::ones(expected)),
        }
    }
}

fn check_cluster_shape(
    what: &'static str,
    matrix: &Array2<f64>,
    expected: (usize, usize),
) -> Result<(), VbNmtfError> {
    if matrix.dim() != expected {
        return Err(VbNmtfError::ShapeMismatch {
            what,
            expected,
            found: matrix.dim(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::truncated_normal;
    use ndarray::array;

    fn two_by_two() -> VbNmtf {
        let r = array![[1.0, 2.0], [3.0, 4.0]];
        let mask = Array2::ones((2, 2));
        let priors = Priors::constant(1.0, 1.0, 1.0, 2, 2, 1, 1);
        VbNmtf::new(r, mask, 1, 1, priors).unwrap()
    }

    #[test]
    fn test_construction_rejects_mask_shape_mismatch() {
        let r = array![[1.0, 2.0], [3.0, 4.0]];
        let mask = Array2::ones((2, 3));
        let priors = Priors::constant(1.0, 1.0, 1.0, 2, 2, 1, 1);
        assert!(matches!(
            VbNmtf::new(r, mask, 1, 1, priors),
            Err(VbNmtfError::ShapeMismatch { what: "M", .. })
        ));
    }

    #[test]
    fn test_construction_rejects_empty_rows_and_columns() {
        let r = Array2::ones((3, 3));
        let mut mask = Array2::ones((3, 3));
        mask.row_mut(1).fill(0.0);
        let priors = Priors::constant(1.0, 1.0, 1.0, 3, 3, 1, 1);
        assert!(matches!(
            VbNmtf::new(r.clone(), mask, 1, 1, priors.clone()),
            Err(VbNmtfError::EmptyRow(1))
        ));

        let mut mask = Array2::ones((3, 3));
        mask.column_mut(2).fill(0.0);
        assert!(matches!(
            VbNmtf::new(r, mask, 1, 1, priors),
            Err(VbNmtfError::EmptyColumn(2))
        ));
    }

    #[test]
    fn test_construction_rejects_zero_rank() {
        let r = Array2::ones((2, 2));
        let mask = Array2::ones((2, 2));
        let priors = Priors::constant(1.0, 1.0, 1.0, 2, 2, 1, 1);
        assert!(matches!(
            VbNmtf::new(r, mask, 0, 1, priors),
            Err(VbNmtfError::InvalidRank("K"))
        ));
    }

    #[test]
    fn test_operations_require_initialise() {
        let mut model = two_by_two();
        assert!(matches!(model.run(1), Err(VbNmtfError::NotInitialised)));
        assert!(matches!(
            model.predict(&Array2::ones((2, 2))),
            Err(VbNmtfError::NotInitialised)
        ));
        assert!(matches!(
            model.quality(QualityMetric::Mse),
            Err(VbNmtfError::NotInitialised)
        ));
    }

    #[test]
    fn test_exp_initialise_concrete_values() {
        // Unit priors: muF = muS = muG = 1, default precisions 1, and the
        // moments follow the truncated-Normal formulas at (1, 1).
        let mut model = two_by_two();
        model.initialise(&InitConfig::default()).unwrap();
        let st = model.state.as_ref().unwrap();

        assert!(st.f.mu.iter().all(|&v| v == 1.0));
        assert!(st.s.mu.iter().all(|&v| v == 1.0));
        assert!(st.g.mu.iter().all(|&v| v == 1.0));
        assert!(st.f.tau.iter().all(|&v| v == 1.0));

        let expected = truncated_normal::expectation(1.0, 1.0);
        assert!(st.f.exp.iter().all(|&v| (v - expected).abs() < 1e-12));
        assert!(st.s.exp.iter().all(|&v| (v - expected).abs() < 1e-12));
        assert!(st.g.exp.iter().all(|&v| (v - expected).abs() < 1e-12));

        assert!(st.alpha_s > 1.0);
        assert!(st.beta_s > 1.0);
        assert!(st.exp_tau > 0.0);
    }

    #[test]
    fn test_run_zero_sweeps_is_a_no_op() {
        let mut model = two_by_two();
        model.initialise(&InitConfig::default()).unwrap();
        let before = model.state.clone().unwrap();

        model.run(0).unwrap();
        let after = model.state.as_ref().unwrap();
        assert_eq!(before.f.mu, after.f.mu);
        assert_eq!(before.s.mu, after.s.mu);
        assert_eq!(before.g.mu, after.g.mu);
        assert_eq!(before.f.exp, after.f.exp);
        assert_eq!(before.alpha_s, after.alpha_s);
        assert_eq!(before.beta_s, after.beta_s);
        assert!(model.history().is_empty());
    }

    #[test]
    fn test_run_fits_the_two_by_two_example() {
        let mut model = two_by_two();
        model.train(&InitConfig::default(), 50).unwrap();
        let mse = model.quality(QualityMetric::Mse).unwrap();
        assert!(mse < 1.0, "MSE after 50 sweeps: {}", mse);
        assert_eq!(model.history().len(), 50);
    }

    #[test]
    fn test_history_appends_across_run_calls() {
        let mut model = two_by_two();
        model.initialise(&InitConfig::default()).unwrap();
        model.run(2).unwrap();
        model.run(3).unwrap();
        let history = model.history();
        assert_eq!(history.len(), 5);
        let iterations: Vec<usize> = history.iter().map(|rec| rec.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3, 4, 5]);
        assert!(history.iter().all(|rec| rec.exp_tau > 0.0));
    }

    #[test]
    fn test_quality_penalties() {
        let mut model = two_by_two();
        model.train(&InitConfig::default(), 5).unwrap();

        let loglik = model.quality(QualityMetric::LogLikelihood).unwrap();
        let bic = model.quality(QualityMetric::Bic).unwrap();
        let aic = model.quality(QualityMetric::Aic).unwrap();

        // P = I K + K L + J L = 2 + 1 + 2, |Omega| = 4.
        let free_parameters = 5.0;
        assert!((bic - (loglik - 0.5 * free_parameters * 4.0f64.ln())).abs() < 1e-12);
        assert!((aic - (loglik - free_parameters)).abs() < 1e-12);

        // Cross-check the log-likelihood itself against its definition.
        let st = model.state.as_ref().unwrap();
        let residual: f64 = {
            let recon = st.reconstruction();
            model
                .r
                .indexed_iter()
                .map(|((i, j), &value)| {
                    model.mask[[i, j]] * (value - recon[[i, j]]).powi(2)
                })
                .sum()
        };
        let expected =
            4.0 / 2.0 * (st.explog_tau - LN_2PI) - st.exp_tau / 2.0 * residual;
        assert!((loglik - expected).abs() < 1e-10);
    }

    #[test]
    fn test_random_initialise_is_reproducible() {
        let config = InitConfig::new(InitS::Random, InitFg::Random).with_seed(123);
        let mut model_a = two_by_two();
        let mut model_b = two_by_two();
        model_a.initialise(&config).unwrap();
        model_b.initialise(&config).unwrap();
        let st_a = model_a.state.as_ref().unwrap();
        let st_b = model_b.state.as_ref().unwrap();
        assert_eq!(st_a.f.mu, st_b.f.mu);
        assert_eq!(st_a.s.mu, st_b.s.mu);
        assert_eq!(st_a.g.mu, st_b.g.mu);
    }

    #[test]
    fn test_tau_override_shape_is_checked() {
        let mut model = two_by_two();
        let config = InitConfig {
            tau_f: Some(Array2::ones((3, 1))),
            ..Default::default()
        };
        assert!(matches!(
            model.initialise(&config),
            Err(VbNmtfError::ShapeMismatch { what: "tauF", .. })
        ));
    }

    #[test]
    fn test_predict_rejects_wrong_mask_shape() {
        let mut model = two_by_two();
        model.initialise(&InitConfig::default()).unwrap();
        assert!(matches!(
            model.predict(&Array2::ones((3, 2))),
            Err(VbNmtfError::ShapeMismatch { .. })
        ));
    }
}
