//! Masked prediction-quality metrics.

use ndarray::Array2;
use serde::Serialize;

/// Prediction performance over a mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub mse: f64,
    pub r_squared: f64,
    pub pearson: f64,
}

/// Mean squared error over the entries selected by `mask`.
pub fn masked_mse(mask: &Array2<f64>, r: &Array2<f64>, r_pred: &Array2<f64>) -> f64 {
    let diff = r - r_pred;
    (mask * &diff.mapv(|v| v * v)).sum() / mask.sum()
}

/// Coefficient of determination over the masked entries. Returns
/// positive infinity when the masked values of `r` have zero variance.
pub fn masked_r2(mask: &Array2<f64>, r: &Array2<f64>, r_pred: &Array2<f64>) -> f64 {
    let mean = (mask * r).sum() / mask.sum();
    let ss_total = (mask * &(r - mean).mapv(|v| v * v)).sum();
    let ss_res = (mask * &(r - r_pred).mapv(|v| v * v)).sum();
    if ss_total != 0.0 {
        1.0 - ss_res / ss_total
    } else {
        f64::INFINITY
    }
}

/// Pearson correlation between `r` and `r_pred` over the masked entries.
pub fn masked_pearson(mask: &Array2<f64>, r: &Array2<f64>, r_pred: &Array2<f64>) -> f64 {
    let count = mask.sum();
    let mean_real = (mask * r).sum() / count;
    let mean_pred = (mask * r_pred).sum() / count;
    let covariance = (mask * &(r - mean_real) * &(r_pred - mean_pred)).sum();
    let variance_real = (mask * &(r - mean_real).mapv(|v| v * v)).sum();
    let variance_pred = (mask * &(r_pred - mean_pred).mapv(|v| v * v)).sum();
    covariance / (variance_real.sqrt() * variance_pred.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let r = array![[1.0, 2.0], [3.0, 4.0]];
        let mask = array![[1.0, 1.0], [1.0, 1.0]];
        assert_eq!(masked_mse(&mask, &r, &r), 0.0);
        assert_eq!(masked_r2(&mask, &r, &r), 1.0);
        assert!((masked_pearson(&mask, &r, &r) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mse_only_counts_masked_entries() {
        let r = array![[1.0, 2.0], [3.0, 4.0]];
        let pred = array![[1.0, 0.0], [3.0, 2.0]];
        let mask = array![[1.0, 0.0], [1.0, 1.0]];
        // Only (1,1) differs among masked entries: (4-2)^2 / 3.
        assert!((masked_mse(&mask, &r, &pred) - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_r2_zero_variance_convention() {
        let r = array![[2.0, 2.0]];
        let pred = array![[1.0, 3.0]];
        let mask = array![[1.0, 1.0]];
        assert_eq!(masked_r2(&mask, &r, &pred), f64::INFINITY);
    }

    #[test]
    fn test_pearson_sign() {
        let r = array![[1.0, 2.0, 3.0, 4.0]];
        let pred = array![[4.0, 3.0, 2.0, 1.0]];
        let mask = array![[1.0, 1.0, 1.0, 1.0]];
        assert!((masked_pearson(&mask, &r, &pred) + 1.0).abs() < 1e-12);
    }
}
