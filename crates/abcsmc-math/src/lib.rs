//! Pure, RNG-free numerical primitives for the ABC-SMC engine: log-domain
//! arithmetic, the four prior density families, and the Gaussian/MVN kernel
//! math used by the perturbation kernel, the weight update, and KLIEP.
//!
//! Sampling and anything that touches a particle store lives in
//! `abcsmc-core`; this crate never draws a random number.

pub mod kernel;
pub mod prior;
pub mod stable;

pub use kernel::{column_covariance, column_mean, gaussian_rbf, MvnKernel, COV_REGULARIZATION_EPS};
pub use prior::PriorDist;
pub use stable::{log_beta, log_gamma, log_sum_exp, std_normal_log_pdf};
