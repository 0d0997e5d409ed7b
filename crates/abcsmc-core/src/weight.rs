//! Recomputes importance weights for a freshly accepted generation (spec
//! §4.7): `w_i = 1` at generation 0, or `pi(x_i) / sum_j w_j * phi(x_i; x_j, Sigma)`
//! for every later generation, then normalizes.

use abcsmc_math::MvnKernel;
use nalgebra::{DMatrix, DVector};

use crate::prior_set::PriorSet;

pub struct WeightUpdater;

impl WeightUpdater {
    /// Generation 0: every accepted particle gets equal unnormalized weight.
    pub fn initial_weights(n_p: usize) -> DVector<f64> {
        normalize(DVector::from_element(n_p, 1.0))
    }

    /// Generation `g > 0`. `x` is the newly accepted `N_p x k` matrix,
    /// `previous_x`/`previous_w` the prior generation's particles and
    /// weights, `kernel_cov` the `Sigma = 2*Cov(x^{(g-1)})` used to perturb
    /// them.
    pub fn update_weights(
        priors: &PriorSet,
        x: &DMatrix<f64>,
        previous_x: &DMatrix<f64>,
        previous_w: &DVector<f64>,
        kernel_cov: &DMatrix<f64>,
    ) -> DVector<f64> {
        let n_p = x.nrows();
        let n_prev = previous_x.nrows();
        let mut unnormalized = DVector::zeros(n_p);

        for i in 0..n_p {
            let xi = x.row(i).transpose();
            let prior_density = priors.density(&xi);
            if prior_density == 0.0 {
                unnormalized[i] = 0.0;
                continue;
            }
            let mut mixture = 0.0;
            for j in 0..n_prev {
                let mean = previous_x.row(j).transpose();
                if let Some(kernel) = MvnKernel::new(mean, kernel_cov) {
                    mixture += previous_w[j] * kernel.pdf(&xi);
                }
            }
            unnormalized[i] = if mixture > 0.0 { prior_density / mixture } else { 0.0 };
        }
        normalize(unnormalized)
    }

    /// `ess = 1 / sum(w_i^2)`.
    pub fn effective_sample_size(w: &DVector<f64>) -> f64 {
        1.0 / w.iter().map(|wi| wi * wi).sum::<f64>()
    }
}

fn normalize(mut w: DVector<f64>) -> DVector<f64> {
    let sum: f64 = w.iter().sum();
    if sum > 0.0 {
        w /= sum;
    }
    w
}
