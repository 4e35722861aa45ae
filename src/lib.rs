//! Variational Bayesian non-negative matrix tri-factorisation.
//!
//! Decomposes a partially observed matrix R (I x J) into non-negative
//! factors F (I x K), S (K x L), G (J x L) with R ~ F . S . G^T, under
//! entrywise Exponential priors on the factors and a Gamma prior on the
//! observation-noise precision. Inference is mean-field coordinate
//! ascent: each factor entry (or column) carries a zero-truncated Normal
//! posterior, the noise precision a Gamma posterior, and sweeps refine
//! them block by block while the evidence lower bound tracks progress.
//!
//! ```no_run
//! use ndarray::Array2;
//! use vb_nmtf::{InitConfig, Priors, QualityMetric, VbNmtf};
//!
//! let r = Array2::from_elem((10, 8), 2.0);
//! let mask = Array2::ones((10, 8));
//! let priors = Priors::constant(1.0, 1.0, 1.0, 10, 8, 3, 2);
//!
//! let mut model = VbNmtf::new(r, mask, 3, 2, priors).unwrap();
//! model.train(&InitConfig::default(), 200).unwrap();
//! println!("BIC: {}", model.quality(QualityMetric::Bic).unwrap());
//! ```

pub mod dist;
pub mod error;
pub mod init;
pub mod metrics;
pub mod model;
pub mod priors;

mod elbo;
mod state;
mod updates;

// Re-exports for convenience
pub use error::VbNmtfError;
pub use init::{InitConfig, InitFg, InitS, KMeansInit, RowClusterer};
pub use metrics::Prediction;
pub use model::{QualityMetric, SweepRecord, VbNmtf};
pub use priors::Priors;
