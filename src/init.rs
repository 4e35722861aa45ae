//! Initialisation strategies for the variational parameters.

use linfa::prelude::{Fit, Predict};
use linfa_clustering::KMeans;
use ndarray::Array2;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand_distr::{Distribution, Exp};

use crate::error::VbNmtfError;

/// How to set the initial locations of S.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitS {
    /// muS = 1/lambdaS elementwise (the prior mean).
    Exp,
    /// muS[k,l] ~ Exponential(lambdaS[k,l]), independently.
    Random,
}

/// How to set the initial locations of F and G.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitFg {
    /// Prior means, 1/lambdaF and 1/lambdaG.
    Exp,
    /// Independent Exponential draws.
    Random,
    /// Cluster the rows of R (and of R^T) and use the membership
    /// matrices as muF and muG directly.
    Kmeans,
}

/// Configuration for [`crate::model::VbNmtf::initialise`].
///
/// Optional precision matrices override the all-ones default for
/// tauF/tauS/tauG. The seed drives every random draw of the
/// initialisation; runs with the same seed are identical.
#[derive(Debug, Clone)]
pub struct InitConfig {
    pub init_s: InitS,
    pub init_fg: InitFg,
    pub tau_f: Option<Array2<f64>>,
    pub tau_s: Option<Array2<f64>>,
    pub tau_g: Option<Array2<f64>>,
    pub seed: Option<u64>,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            init_s: InitS::Exp,
            init_fg: InitFg::Exp,
            tau_f: None,
            tau_s: None,
            tau_g: None,
            seed: None,
        }
    }
}

impl InitConfig {
    pub fn new(init_s: InitS, init_fg: InitFg) -> Self {
        Self {
            init_s,
            init_fg,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Row-clustering collaborator used by the k-means warm start.
///
/// Implementations assign each row of `data` to one of `n_clusters`
/// clusters, honouring `mask` (1 = observed), and return a non-negative
/// (rows x n_clusters) matrix consumed directly as initial locations.
pub trait RowClusterer: Send + Sync {
    fn cluster(
        &self,
        data: &Array2<f64>,
        mask: &Array2<f64>,
        n_clusters: usize,
        rng: &mut StdRng,
    ) -> Result<Array2<f64>, VbNmtfError>;
}

/// Default [`RowClusterer`]: impute unobserved entries with observed
/// column means, run k-means, and return the 0/1 membership matrix.
#[derive(Debug, Clone)]
pub struct KMeansInit {
    pub max_iter: u64,
    pub tolerance: f64,
}

impl Default for KMeansInit {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-4,
        }
    }
}

impl RowClusterer for KMeansInit {
    fn cluster(
        &self,
        data: &Array2<f64>,
        mask: &Array2<f64>,
        n_clusters: usize,
        rng: &mut StdRng,
    ) -> Result<Array2<f64>, VbNmtfError> {
        let (n_rows, n_cols) = data.dim();

        // Column means over observed entries; the model's construction
        // invariant guarantees every column has at least one.
        let mut column_means = vec![0.0; n_cols];
        for j in 0..n_cols {
            let observed = mask.column(j).sum();
            column_means[j] = (&data.column(j) * &mask.column(j)).sum() / observed;
        }

        let mut imputed = data.clone();
        for ((i, j), value) in imputed.indexed_iter_mut() {
            if mask[[i, j]] == 0.0 {
                *value = column_means[j];
            }
        }

        let dataset = linfa::Dataset::from(imputed.clone());
        let model = KMeans::params_with_rng(n_clusters, rng.clone())
            .max_n_iterations(self.max_iter)
            .tolerance(self.tolerance)
            .fit(&dataset)
            .map_err(|e| VbNmtfError::Clustering(e.to_string()))?;
        let labels = model.predict(&imputed);

        let mut membership = Array2::zeros((n_rows, n_clusters));
        for (i, &label) in labels.iter().enumerate() {
            membership[[i, label]] = 1.0;
        }
        Ok(membership)
    }
}

/// Elementwise Exponential draws with the given rate matrix.
pub(crate) fn draw_exponential(
    lambda: &Array2<f64>,
    what: &'static str,
    rng: &mut StdRng,
) -> Result<Array2<f64>, VbNmtfError> {
    let mut out = Array2::zeros(lambda.dim());
    for (value, &rate) in out.iter_mut().zip(lambda.iter()) {
        let dist = Exp::new(rate).map_err(|_| VbNmtfError::NonPositivePrior(what))?;
        *value = dist.sample(rng);
    }
    Ok(out)
}
