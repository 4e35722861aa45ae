//! Coordinate-ascent updates for the variational posteriors.
//!
//! Each update completes the square of the expected negative log-joint
//! under the mean-field factorisation, yielding truncated-Normal natural
//! parameters for the factor blocks and Gamma parameters for the noise
//! precision. Updates write natural parameters only; the caller refreshes
//! the affected moments immediately afterwards.
//!
//! Within a block the updates are Gauss-Seidel: each entry (or column)
//! reads the live moments of its siblings. The noise precision must be
//! recomputed after every full block before the next block runs.

use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};

use crate::state::VbState;

/// Outer product of two vectors as an (a.len, b.len) matrix.
fn outer(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array2<f64> {
    let col = a.insert_axis(Axis(1));
    let row = b.insert_axis(Axis(0));
    col.dot(&row)
}

/// Update the truncated-Normal natural parameters of S[k, l].
pub(crate) fn update_s(
    r: &Array2<f64>,
    m: &Array2<f64>,
    lambda_s: &Array2<f64>,
    st: &mut VbState,
    k: usize,
    l: usize,
) {
    let exp_tau = st.exp_tau;
    let f_k = st.f.exp.column(k).to_owned();
    let g_l = st.g.exp.column(l).to_owned();
    let s_kl = st.s.exp[[k, l]];

    // Precision: E[tau] * sum_Omega E[F_ik^2] E[G_jl^2].
    let fk_sq = &st.f.var.column(k) + &f_k.mapv(|v| v * v);
    let gl_sq = &st.g.var.column(l) + &g_l.mapv(|v| v * v);
    let tau_kl = exp_tau * (m * &outer(fk_sq.view(), gl_sq.view())).sum();

    // Leave-one-component-out residual times the component's basis.
    let fg = outer(f_k.view(), g_l.view());
    let residual = &(r - &st.reconstruction()) + &fg.mapv(|v| v * s_kl);
    let data_term = (m * &(&residual * &fg)).sum();

    // Variance cross-terms: F's other components against varG[:, l], and
    // varF[:, k] against S row k's other components through G.
    let f_sl = st.f.exp.dot(&st.s.exp.column(l));
    let left = &f_k * &(&f_sl - &f_k.mapv(|v| v * s_kl));
    let cross_g = (m * &outer(left.view(), st.g.var.column(l))).sum();

    let sk_g = st.s.exp.row(k).dot(&st.g.exp.t());
    let right = &g_l * &(&sk_g - &g_l.mapv(|v| v * s_kl));
    let cross_f = (m * &outer(st.f.var.column(k), right.view())).sum();

    st.s.tau[[k, l]] = tau_kl;
    st.s.mu[[k, l]] = (-lambda_s[[k, l]] + exp_tau * (data_term - cross_g - cross_f)) / tau_kl;
}

/// Update column k of F, vectorized over the rows.
pub(crate) fn update_f(
    r: &Array2<f64>,
    m: &Array2<f64>,
    lambda_f: &Array2<f64>,
    st: &mut VbState,
    k: usize,
) {
    let exp_tau = st.exp_tau;
    let f_k = st.f.exp.column(k).to_owned();
    let s_row = st.s.exp.row(k).to_owned();

    // Variance-of-product correction for S row k against G, length J.
    let s_row_sq = &st.s.var.row(k) + &s_row.mapv(|v| v * v);
    let g_sq = st.g.second_moment();
    let var_sk_g =
        s_row_sq.dot(&g_sq.t()) - s_row.mapv(|v| v * v).dot(&st.g.exp.mapv(|v| v * v).t());

    let sk_g = s_row.dot(&st.g.exp.t());
    let row_term = &var_sk_g + &sk_g.mapv(|v| v * v);
    let tau_col = m.dot(&row_term).mapv(|v| exp_tau * v);

    // Leave-k-out residual against S row k's interaction with G.
    let residual = &(r - &st.reconstruction()) + &outer(f_k.view(), sk_g.view());
    let data_term = (m * &(&residual * &sk_g)).sum_axis(Axis(1));

    // Cross-term: other components' S.F products through varG, with the
    // k-specific double count removed.
    let weighted = &st.f.exp.dot(&st.s.exp) * &s_row;
    let sk2_var_g = s_row.mapv(|v| v * v).dot(&st.g.var.t());
    let cross = &weighted.dot(&st.g.var.t()) - &outer(f_k.view(), sk2_var_g.view());
    let cross_term = (m * &cross).sum_axis(Axis(1));

    let mut mu_col = Array1::zeros(tau_col.len());
    Zip::from(&mut mu_col)
        .and(&tau_col)
        .and(&lambda_f.column(k))
        .and(&data_term)
        .and(&cross_term)
        .for_each(|mu, &tau, &lambda, &data, &cross| {
            *mu = (-lambda + exp_tau * (data - cross)) / tau;
        });

    st.f.tau.column_mut(k).assign(&tau_col);
    st.f.mu.column_mut(k).assign(&mu_col);
}

/// Update column l of G; the mirror image of `update_f` with the roles
/// of F/S and G/S^T swapped.
pub(crate) fn update_g(
    r: &Array2<f64>,
    m: &Array2<f64>,
    lambda_g: &Array2<f64>,
    st: &mut VbState,
    l: usize,
) {
    let exp_tau = st.exp_tau;
    let g_l = st.g.exp.column(l).to_owned();
    let s_col = st.s.exp.column(l).to_owned();

    // Variance-of-product correction for F against S column l, length I.
    let s_col_sq = &st.s.var.column(l) + &s_col.mapv(|v| v * v);
    let f_sq = st.f.second_moment();
    let var_f_sl =
        f_sq.dot(&s_col_sq) - st.f.exp.mapv(|v| v * v).dot(&s_col.mapv(|v| v * v));

    let f_sl = st.f.exp.dot(&s_col);
    let col_term = &var_f_sl + &f_sl.mapv(|v| v * v);
    let tau_col = m.t().dot(&col_term).mapv(|v| exp_tau * v);

    // Leave-l-out residual against F's interaction with S column l.
    let residual = &(r - &st.reconstruction()) + &outer(f_sl.view(), g_l.view());
    let data_term = (m * &residual).t().dot(&f_sl);

    // Cross-term: varF through S column l and the S.G^T interactions,
    // with the l-specific double count removed.
    let s_g = st.s.exp.dot(&st.g.exp.t());
    let weighted = &s_g * &s_col.view().insert_axis(Axis(1));
    let sl2_var_f = st.f.var.dot(&s_col.mapv(|v| v * v));
    let cross = &st.f.var.dot(&weighted) - &outer(sl2_var_f.view(), g_l.view());
    let cross_term = (m * &cross).sum_axis(Axis(0));

    let mut mu_col = Array1::zeros(tau_col.len());
    Zip::from(&mut mu_col)
        .and(&tau_col)
        .and(&lambda_g.column(l))
        .and(&data_term)
        .and(&cross_term)
        .for_each(|mu, &tau, &lambda, &data, &cross| {
            *mu = (-lambda + exp_tau * (data - cross)) / tau;
        });

    st.g.tau.column_mut(l).assign(&tau_col);
    st.g.mu.column_mut(l).assign(&mu_col);
}

/// Update the Gamma posterior over the noise precision.
pub(crate) fn update_tau(
    r: &Array2<f64>,
    m: &Array2<f64>,
    alpha: f64,
    beta: f64,
    size_omega: f64,
    st: &mut VbState,
) {
    st.alpha_s = alpha + size_omega / 2.0;
    st.beta_s = beta + 0.5 * exp_square_diff(r, m, st);
}

/// E[ sum_Omega (R_ij - (F S G^T)_ij)^2 ] under the variational posterior.
///
/// Decomposes into four masked sums: the squared point-estimate residual,
/// the trilinear second-moment correction, and the two cross-terms from
/// F's and G's variances propagated through the other blocks' means.
pub(crate) fn exp_square_diff(r: &Array2<f64>, m: &Array2<f64>, st: &VbState) -> f64 {
    let f_sq = st.f.second_moment();
    let s_sq = st.s.second_moment();
    let g_sq = st.g.second_moment();
    let f_e2 = st.f.exp.mapv(|v| v * v);
    let s_e2 = st.s.exp.mapv(|v| v * v);
    let g_e2 = st.g.exp.mapv(|v| v * v);

    let point = (m * &(r - &st.reconstruction()).mapv(|v| v * v)).sum();

    let trilinear =
        (m * &(&f_sq.dot(&s_sq).dot(&g_sq.t()) - &f_e2.dot(&s_e2).dot(&g_e2.t()))).sum();

    let s_g = st.s.exp.dot(&st.g.exp.t());
    let cross_f =
        (m * &st.f.var.dot(&(&s_g.mapv(|v| v * v) - &s_e2.dot(&g_e2.t())))).sum();

    let f_s = st.f.exp.dot(&st.s.exp);
    let cross_g =
        (m * &(&f_s.mapv(|v| v * v) - &f_e2.dot(&s_e2)).dot(&st.g.var.t())).sum();

    point + trilinear + cross_f + cross_g
}
