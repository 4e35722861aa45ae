//! Prior hyperparameters for the tri-factorisation model.

use ndarray::Array2;

use crate::error::VbNmtfError;

/// Priors over the noise precision and the three factor matrices.
///
/// `alpha`/`beta` are the Gamma shape and rate for the noise precision
/// tau; `lambda_f`/`lambda_s`/`lambda_g` are the rates of the entrywise
/// Exponential priors on F (IxK), S (KxL) and G (JxL). All values must
/// be strictly positive.
#[derive(Debug, Clone)]
pub struct Priors {
    pub alpha: f64,
    pub beta: f64,
    pub lambda_f: Array2<f64>,
    pub lambda_s: Array2<f64>,
    pub lambda_g: Array2<f64>,
}

impl Priors {
    /// Flat priors: a single rate for every entry of F, S and G.
    pub fn constant(alpha: f64, beta: f64, lambda: f64, i: usize, j: usize, k: usize, l: usize) -> Self {
        Self {
            alpha,
            beta,
            lambda_f: Array2::from_elem((i, k), lambda),
            lambda_s: Array2::from_elem((k, l), lambda),
            lambda_g: Array2::from_elem((j, l), lambda),
        }
    }

    pub(crate) fn validate(
        &self,
        i: usize,
        j: usize,
        k: usize,
        l: usize,
    ) -> Result<(), VbNmtfError> {
        if !(self.alpha > 0.0) {
            return Err(VbNmtfError::NonPositivePrior("alpha"));
        }
        if !(self.beta > 0.0) {
            return Err(VbNmtfError::NonPositivePrior("beta"));
        }
        check_shape("lambdaF", &self.lambda_f, (i, k))?;
        check_shape("lambdaS", &self.lambda_s, (k, l))?;
        check_shape("lambdaG", &self.lambda_g, (j, l))?;
        check_positive("lambdaF", &self.lambda_f)?;
        check_positive("lambdaS", &self.lambda_s)?;
        check_positive("lambdaG", &self.lambda_g)?;
        Ok(())
    }
}

fn check_shape(
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

fn check_positive(what: &'static str, matrix: &Array2<f64>) -> Result<(), VbNmtfError> {
    if matrix.iter().any(|&v| !(v > 0.0)) {
        return Err(VbNmtfError::NonPositivePrior(what));
    }
    Ok(())
}
