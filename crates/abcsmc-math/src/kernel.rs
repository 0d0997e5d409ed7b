//! Multivariate-normal and Gaussian-kernel math shared by the perturbation
//! kernel (spec §4.3), the weight update (spec §4.7), and KLIEP (spec §4.8).

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use std::f64::consts::PI;

/// Regularizes a covariance matrix by adding `eps * I` and Cholesky-factors
/// it. Resolves the open question in spec §9: zero-variance parameters (a
/// degenerate `2*Cov` kernel) are handled by this fixed jitter rather than
/// failing outright.
pub const COV_REGULARIZATION_EPS: f64 = 1e-12;

/// A covariance matrix pre-factored for repeated MVN density evaluations.
pub struct MvnKernel {
    mean: DVector<f64>,
    chol: Cholesky<f64, Dyn>,
    log_det: f64,
    dim: usize,
}

impl MvnKernel {
    /// Builds a kernel from a mean vector and covariance matrix, adding
    /// `COV_REGULARIZATION_EPS * I` before factoring. Returns `None` only if
    /// the matrix remains non-positive-definite after regularization (e.g.
    /// malformed input with mismatched dimensions or negative definite).
    pub fn new(mean: DVector<f64>, cov: &DMatrix<f64>) -> Option<Self> {
        let dim = mean.len();
        debug_assert_eq!(cov.nrows(), dim);
        debug_assert_eq!(cov.ncols(), dim);
        let regularized = cov + DMatrix::identity(dim, dim) * COV_REGULARIZATION_EPS;
        let chol = Cholesky::new(regularized)?;
        let log_det = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        Some(MvnKernel { mean, chol, log_det, dim })
    }

    /// log N(x ; mean, cov).
    pub fn log_pdf(&self, x: &DVector<f64>) -> f64 {
        let diff = x - &self.mean;
        let solved = self.chol.solve(&diff);
        let quad_form = diff.dot(&solved);
        let k = self.dim as f64;
        -0.5 * (k * (2.0 * PI).ln() + self.log_det + quad_form)
    }

    /// N(x ; mean, cov).
    pub fn pdf(&self, x: &DVector<f64>) -> f64 {
        self.log_pdf(x).exp()
    }

    /// Draws a sample `mean + L * z` where `z ~ N(0, I)` and `L` is the
    /// regularized Cholesky factor.
    pub fn sample(&self, standard_normals: &DVector<f64>) -> DVector<f64> {
        &self.mean + self.chol.l() * standard_normals
    }
}

/// Isotropic Gaussian RBF kernel `K(x, c; sigma) = exp(-||x-c||^2 / (2*sigma^2))`,
/// the kernel KLIEP (spec §4.8) mixes over a subset of centers.
pub fn gaussian_rbf(x: &DVector<f64>, center: &DVector<f64>, sigma: f64) -> f64 {
    let sq_dist = (x - center).norm_squared();
    (-sq_dist / (2.0 * sigma * sigma)).exp()
}

/// Sample mean of a set of row-vectors (each column of `data`, shape `k x N`).
pub fn column_mean(data: &DMatrix<f64>) -> DVector<f64> {
    let n = data.ncols() as f64;
    if n == 0.0 {
        return DVector::zeros(data.nrows());
    }
    data.column_sum() / n
}

/// Sample covariance of column-vectors (shape `k x N`), using the `N-1`
/// (Bessel-corrected) denominator; falls back to a zero matrix for `N <= 1`.
pub fn column_covariance(data: &DMatrix<f64>) -> DMatrix<f64> {
    let k = data.nrows();
    let n = data.ncols();
    if n <= 1 {
        return DMatrix::zeros(k, k);
    }
    let mean = column_mean(data);
    let mut centered = data.clone();
    for mut col in centered.column_iter_mut() {
        col -= &mean;
    }
    (&centered * centered.transpose()) / ((n - 1) as f64)
}
