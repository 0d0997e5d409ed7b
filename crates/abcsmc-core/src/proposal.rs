//! Draws proposal particles: independent prior draws for generation 0, or
//! weighted-ancestor resampling plus a Gaussian perturbation kernel for
//! every later generation (spec §4.3).

use crate::prior_set::PriorSet;
use abcsmc_common::{Error, Result};
use abcsmc_math::{kernel::column_covariance, MvnKernel, PriorDist};
use nalgebra::{DMatrix, DVector};
use rand::distributions::{Distribution, Uniform, WeightedIndex};
use rand::Rng;
use rand_distr::{Gamma as GammaDist, LogNormal as LogNormalDist, Normal as NormalDist};

/// The literature-standard kernel-covariance scaling factor (spec §4.3):
/// `Sigma = 2 * Cov(x^{(g-1)})`.
const KERNEL_COV_SCALE: f64 = 2.0;

const MAX_REJECTION_ATTEMPTS: usize = 100_000;

/// One proposed particle, with its ancestor row index in the previous
/// generation (`None` for generation 0, which has no ancestor).
#[derive(Debug, Clone)]
pub struct Proposal {
    pub values: DVector<f64>,
    pub ancestor: Option<usize>,
}

/// Draws one sample from a single prior family.
fn sample_one(dist: &PriorDist, rng: &mut impl Rng) -> f64 {
    match *dist {
        PriorDist::Uniform { a, b } => Uniform::new_inclusive(a, b).sample(rng),
        PriorDist::Normal { mean, sd } => NormalDist::new(mean, sd).expect("validated sd > 0").sample(rng),
        PriorDist::LogNormal { mu, sigma } => {
            LogNormalDist::new(mu, sigma).expect("validated sigma > 0").sample(rng)
        }
        PriorDist::Gamma { shape, rate } => {
            GammaDist::new(shape, 1.0 / rate).expect("validated shape, rate > 0").sample(rng)
        }
    }
}

/// Computes the perturbation kernel's covariance `2 * Cov(x)` from an
/// `N_p x k` particle matrix (spec §4.3, §4.7).
pub fn kernel_covariance(x: &DMatrix<f64>) -> DMatrix<f64> {
    column_covariance(&x.transpose()) * KERNEL_COV_SCALE
}

pub struct ProposalSampler<'a> {
    priors: &'a PriorSet,
}

impl<'a> ProposalSampler<'a> {
    pub fn new(priors: &'a PriorSet) -> Self {
        ProposalSampler { priors }
    }

    /// Generation 0: independent draws from each parameter's prior.
    pub fn propose_initial(&self, rng: &mut impl Rng) -> Proposal {
        let values = DVector::from_iterator(
            self.priors.len(),
            self.priors.dists().iter().map(|dist| sample_one(dist, rng)),
        );
        Proposal { values, ancestor: None }
    }

    /// Generation `g > 0`: resamples an ancestor from `Categorical(w)`,
    /// perturbs it by `N(0, Sigma)`, and rejects (retrying) perturbations
    /// that land outside the joint prior's support.
    pub fn propose_perturbed(
        &self,
        previous_x: &DMatrix<f64>,
        previous_w: &DVector<f64>,
        kernel_cov: &DMatrix<f64>,
        rng: &mut impl Rng,
    ) -> Result<Proposal> {
        let weights: Vec<f64> = previous_w.iter().copied().collect();
        let sampler = WeightedIndex::new(&weights)
            .map_err(|e| Error::Simulation(format!("could not build ancestor sampler: {e}")))?;

        for _ in 0..MAX_REJECTION_ATTEMPTS {
            let ancestor = sampler.sample(rng);
            let mean = previous_x.row(ancestor).transpose();
            let kernel = MvnKernel::new(mean, kernel_cov).ok_or_else(|| {
                Error::Simulation("perturbation kernel covariance is not positive-definite".into())
            })?;
            let z = DVector::from_iterator(
                kernel_cov.nrows(),
                (0..kernel_cov.nrows()).map(|_| NormalDist::new(0.0, 1.0).unwrap().sample(rng)),
            );
            let candidate = kernel.sample(&z);
            if self.priors.density(&candidate) > 0.0 {
                return Ok(Proposal { values: candidate, ancestor: Some(ancestor) });
            }
        }
        Err(Error::Simulation(format!(
            "exceeded {MAX_REJECTION_ATTEMPTS} rejection-sampling attempts for a perturbed proposal"
        )))
    }

    /// Draws `n` proposals, used for the `ldata` (per-node) target where one
    /// trajectory carries many particles (spec §4.3: "a batch of `n`
    /// proposals").
    pub fn propose_batch(
        &self,
        n: usize,
        previous: Option<(&DMatrix<f64>, &DVector<f64>, &DMatrix<f64>)>,
        rng: &mut impl Rng,
    ) -> Result<Vec<Proposal>> {
        (0..n)
            .map(|_| match previous {
                None => Ok(self.propose_initial(rng)),
                Some((x, w, cov)) => self.propose_perturbed(x, w, cov, rng),
            })
            .collect()
    }
}
