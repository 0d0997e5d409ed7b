//! Kullback-Leibler Importance Estimation Procedure (spec §4.8): fits a
//! nonnegative Gaussian-kernel density ratio `r(x) = sum_b alpha_b * K(x,
//! c_b; sigma)` between a "new generation" sample and a "previous
//! generation" sample, by projected gradient ascent with backtracking.

use abcsmc_common::{Error, Result};
use abcsmc_math::gaussian_rbf;
use nalgebra::DVector;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const MAX_CENTERS: usize = 100;
const BANDWIDTH_GRID: [f64; 7] = [0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0];
const GRADIENT_MAX_ITERS: usize = 100;
const GRADIENT_TOLERANCE: f64 = 1e-5;
const BACKTRACK_STEPS: usize = 30;

/// A fitted density-ratio model, queryable at any point.
#[derive(Debug, Clone)]
pub struct DensityRatioModel {
    centers: Vec<DVector<f64>>,
    alpha: Vec<f64>,
    sigma: f64,
}

impl DensityRatioModel {
    /// `r(x) = sum_b alpha_b * K(x, c_b; sigma)`.
    pub fn density_ratio(&self, x: &DVector<f64>) -> f64 {
        self.centers
            .iter()
            .zip(&self.alpha)
            .map(|(c, &a)| a * gaussian_rbf(x, c, self.sigma))
            .sum()
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn centers(&self) -> &[DVector<f64>] {
        &self.centers
    }
}

pub struct KliepEstimator;

impl KliepEstimator {
    /// Fits `r(x)` from `xnu` (target / new generation) against `xde`
    /// (source / previous generation). Center selection is a deterministic
    /// function of `seed`.
    pub fn fit(xnu: &[DVector<f64>], xde: &[DVector<f64>], seed: u64) -> Result<DensityRatioModel> {
        if xnu.is_empty() || xde.is_empty() {
            return Err(Error::Simulation("KLIEP requires non-empty xnu and xde samples".into()));
        }
        let centers = select_centers(xnu, seed);
        let sigma = select_bandwidth(xnu, xde, &centers);
        let alpha = fit_alpha(xnu, xde, &centers, sigma)?;
        Ok(DensityRatioModel { centers, alpha, sigma })
    }
}

fn select_centers(xnu: &[DVector<f64>], seed: u64) -> Vec<DVector<f64>> {
    let b = xnu.len().min(MAX_CENTERS);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..xnu.len()).collect();
    indices.shuffle(&mut rng);
    indices.truncate(b);
    indices.sort_unstable();
    indices.into_iter().map(|i| xnu[i].clone()).collect()
}

fn design_row(point: &DVector<f64>, centers: &[DVector<f64>], sigma: f64) -> Vec<f64> {
    centers.iter().map(|c| gaussian_rbf(point, c, sigma)).collect()
}

fn design_matrix(points: &[DVector<f64>], centers: &[DVector<f64>], sigma: f64) -> Vec<Vec<f64>> {
    points.iter().map(|p| design_row(p, centers, sigma)).collect()
}

fn dot(row: &[f64], alpha: &[f64]) -> f64 {
    row.iter().zip(alpha).map(|(r, a)| r * a).sum()
}

fn mean_log_ratio(phi_nu: &[Vec<f64>], alpha: &[f64]) -> f64 {
    phi_nu.iter().map(|row| dot(row, alpha).max(1e-300).ln()).sum::<f64>() / phi_nu.len() as f64
}

/// Projects onto the feasible set: `alpha >= 0` and
/// `(1/N_de) sum_de r(x_de) = 1` (spec §4.8).
fn project_feasible(alpha: &mut [f64], mean_de: &[f64]) {
    for a in alpha.iter_mut() {
        if *a < 0.0 {
            *a = 0.0;
        }
    }
    let normalization: f64 = alpha.iter().zip(mean_de).map(|(a, m)| a * m).sum();
    if normalization > 0.0 {
        for a in alpha.iter_mut() {
            *a /= normalization;
        }
    }
}

/// Projected gradient ascent on `sum_nu log r(x_nu)` with backtracking line
/// search, for a fixed bandwidth and fixed centers.
fn fit_alpha(
    xnu: &[DVector<f64>],
    xde: &[DVector<f64>],
    centers: &[DVector<f64>],
    sigma: f64,
) -> Result<Vec<f64>> {
    let b = centers.len();
    if b == 0 {
        return Err(Error::Simulation("KLIEP requires at least one center".into()));
    }
    let phi_nu = design_matrix(xnu, centers, sigma);
    let phi_de = design_matrix(xde, centers, sigma);
    let n_de = xde.len() as f64;
    let mean_de: Vec<f64> =
        (0..b).map(|k| phi_de.iter().map(|row| row[k]).sum::<f64>() / n_de).collect();

    let mut alpha = vec![1.0; b];
    project_feasible(&mut alpha, &mean_de);
    let mut objective = mean_log_ratio(&phi_nu, &alpha);
    let mut step = 1.0;

    for _ in 0..GRADIENT_MAX_ITERS {
        let n_nu = xnu.len() as f64;
        let gradient: Vec<f64> = (0..b)
            .map(|k| phi_nu.iter().map(|row| row[k] / dot(row, &alpha).max(1e-300)).sum::<f64>() / n_nu)
            .collect();

        let mut local_step = step;
        let mut improved = false;
        for _ in 0..BACKTRACK_STEPS {
            let mut candidate: Vec<f64> =
                alpha.iter().zip(&gradient).map(|(a, g)| a + local_step * g).collect();
            project_feasible(&mut candidate, &mean_de);
            let candidate_objective = mean_log_ratio(&phi_nu, &candidate);
            if candidate_objective > objective {
                let improvement = candidate_objective - objective;
                alpha = candidate;
                objective = candidate_objective;
                step = local_step;
                improved = improvement.abs() >= GRADIENT_TOLERANCE;
                break;
            }
            local_step *= 0.5;
        }
        if !improved {
            break;
        }
    }
    Ok(alpha)
}

fn loo_score(xnu: &[DVector<f64>], xde: &[DVector<f64>], centers: &[DVector<f64>], sigma: f64) -> f64 {
    let n = xnu.len();
    if n < 2 {
        return f64::NEG_INFINITY;
    }
    let mut total = 0.0;
    let mut folds = 0;
    for held_out in 0..n {
        let training: Vec<DVector<f64>> =
            xnu.iter().enumerate().filter(|(i, _)| *i != held_out).map(|(_, x)| x.clone()).collect();
        let Ok(alpha) = fit_alpha(&training, xde, centers, sigma) else { continue };
        let ratio = centers
            .iter()
            .zip(&alpha)
            .map(|(c, &a)| a * gaussian_rbf(&xnu[held_out], c, sigma))
            .sum::<f64>();
        total += ratio.max(1e-300).ln();
        folds += 1;
    }
    if folds == 0 {
        f64::NEG_INFINITY
    } else {
        total / folds as f64
    }
}

/// Selects the bandwidth on `BANDWIDTH_GRID` maximizing leave-one-out
/// held-out log density ratio over `xnu` (spec §4.8).
fn select_bandwidth(xnu: &[DVector<f64>], xde: &[DVector<f64>], centers: &[DVector<f64>]) -> f64 {
    let mut best_sigma = BANDWIDTH_GRID[0];
    let mut best_score = f64::NEG_INFINITY;
    for &sigma in &BANDWIDTH_GRID {
        let score = loo_score(xnu, xde, centers, sigma);
        if score > best_score {
            best_score = score;
            best_sigma = sigma;
        }
    }
    best_sigma
}
