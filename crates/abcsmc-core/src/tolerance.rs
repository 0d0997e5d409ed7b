//! Picks the next generation's tolerance when the caller supplied no
//! explicit schedule (spec §4.9): an oversample-and-sort rule for
//! generation 1, and a KLIEP-supremum-based rule for every later
//! generation, plus the stopping test.

use crate::kliep::{DensityRatioModel, KliepEstimator};
use abcsmc_common::{Error, Result};
use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;

/// Generation-1 oversample count must exceed `n_particles` (spec §4.9).
pub fn initial_tolerance(distances: &DMatrix<f64>, n_particles: usize) -> Result<(f64, Vec<usize>)> {
    if distances.ncols() != 1 {
        return Err(Error::AdaptiveRequiresUnivariate { actual: distances.ncols() });
    }
    let n_init = distances.nrows();
    if n_init <= n_particles {
        return Err(Error::InitNotLargerThanParticles { n_init, n_particles });
    }

    let mut indexed: Vec<(usize, f64)> = (0..n_init).map(|i| (i, distances[(i, 0)])).collect();
    indexed.sort_by_key(|&(_, v)| OrderedFloat(v));

    let tolerance = indexed[n_particles - 1].1;
    let selected = indexed[..n_particles].iter().map(|&(i, _)| i).collect();
    Ok((tolerance, selected))
}

fn coarse_grid_max_1d(f: &impl Fn(f64) -> f64, lo: f64, hi: f64, steps: usize) -> f64 {
    let mut best_x = lo;
    let mut best_v = f64::NEG_INFINITY;
    for i in 0..=steps {
        let x = lo + (hi - lo) * (i as f64 / steps as f64);
        let v = f(x);
        if v > best_v {
            best_v = v;
            best_x = x;
        }
    }
    best_x
}

fn golden_section_refine(f: &impl Fn(f64) -> f64, mut lo: f64, mut hi: f64, iters: usize) -> f64 {
    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut c = hi - inv_phi * (hi - lo);
    let mut d = lo + inv_phi * (hi - lo);
    let mut fc = f(c);
    let mut fd = f(d);
    for _ in 0..iters {
        if fc > fd {
            hi = d;
            d = c;
            fd = fc;
            c = hi - inv_phi * (hi - lo);
            fc = f(c);
        } else {
            lo = c;
            c = d;
            fc = fd;
            d = lo + inv_phi * (hi - lo);
            fd = f(d);
        }
    }
    fc.max(fd).max(f((lo + hi) / 2.0))
}

/// For `k = 1`: bracketed search over `[min(xnu), max(xnu)]` (spec §4.9).
fn supremum_1d(model: &DensityRatioModel, xnu: &[DVector<f64>]) -> f64 {
    let values: Vec<f64> = xnu.iter().map(|x| x[0]).collect();
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let f = |x: f64| model.density_ratio(&DVector::from_vec(vec![x]));
    if (hi - lo).abs() < f64::EPSILON {
        return f(lo);
    }
    let seed_x = coarse_grid_max_1d(&f, lo, hi, 200);
    let window = (hi - lo) / 200.0;
    golden_section_refine(&f, (seed_x - window).max(lo), (seed_x + window).min(hi), 60)
}

/// Unbounded Nelder-Mead simplex maximization, seeded at `start` (spec
/// §4.9's "derivative-free simplex method... seeded at `xnu[0]`").
fn nelder_mead_max(f: impl Fn(&DVector<f64>) -> f64, start: &DVector<f64>, iters: usize) -> f64 {
    let k = start.len();
    let neg_f = |x: &DVector<f64>| -f(x);

    let mut simplex: Vec<DVector<f64>> = vec![start.clone()];
    for i in 0..k {
        let mut vertex = start.clone();
        vertex[i] += if vertex[i].abs() > 1e-6 { vertex[i] * 0.05 } else { 0.1 };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(&neg_f).collect();

    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    for _ in 0..iters {
        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by_key(|&i| OrderedFloat(values[i]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let centroid = simplex[..k].iter().fold(DVector::zeros(k), |acc, x| acc + x) / k as f64;
        let worst = simplex[k].clone();
        let reflected = &centroid + ALPHA * (&centroid - &worst);
        let f_reflected = neg_f(&reflected);

        if f_reflected < values[0] {
            let expanded = &centroid + GAMMA * (&reflected - &centroid);
            let f_expanded = neg_f(&expanded);
            if f_expanded < f_reflected {
                simplex[k] = expanded;
                values[k] = f_expanded;
            } else {
                simplex[k] = reflected;
                values[k] = f_reflected;
            }
        } else if f_reflected < values[k - 1] {
            simplex[k] = reflected;
            values[k] = f_reflected;
        } else {
            let contracted = &centroid + RHO * (&worst - &centroid);
            let f_contracted = neg_f(&contracted);
            if f_contracted < values[k] {
                simplex[k] = contracted;
                values[k] = f_contracted;
            } else {
                let best = simplex[0].clone();
                for i in 1..=k {
                    simplex[i] = &best + SIGMA * (&simplex[i] - &best);
                    values[i] = neg_f(&simplex[i]);
                }
            }
        }
    }
    -values.iter().cloned().fold(f64::INFINITY, f64::min)
}

/// Generation `g >= 2`: fits KLIEP between `current_x` and `previous_x`,
/// finds `sup r`, and either signals termination (`Ok(None)`) or returns the
/// next scalar tolerance (spec §4.9).
pub fn next_tolerance(
    current_x: &[DVector<f64>],
    previous_x: &[DVector<f64>],
    current_summed_distances: &[f64],
    n_particles: usize,
    generation_index: usize,
    seed: u64,
) -> Result<Option<f64>> {
    let model = KliepEstimator::fit(current_x, previous_x, seed)?;
    let k = current_x[0].len();
    let c_t = if k == 1 {
        supremum_1d(&model, current_x)
    } else {
        nelder_mead_max(|x| model.density_ratio(x), &current_x[0], 200)
    }
    .max(f64::MIN_POSITIVE);

    let q_t = 1.0 / c_t;
    if q_t > 0.99 && generation_index >= 3 {
        return Ok(None);
    }

    let rank = ((q_t * n_particles as f64).ceil() as usize).clamp(1, current_summed_distances.len());
    let mut sorted = current_summed_distances.to_vec();
    sorted.sort_by_key(|&v| OrderedFloat(v));
    Ok(Some(sorted[rank - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn generation_one_takes_nth_smallest_as_tolerance() {
        let distances = DMatrix::from_row_slice(5, 1, &[0.5, 0.1, 0.3, 0.2, 0.4]);
        let (tolerance, selected) = initial_tolerance(&distances, 3).unwrap();
        assert_relative_eq!(tolerance, 0.3, epsilon = 1e-12);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn generation_one_requires_n_init_greater_than_particles() {
        let distances = DMatrix::from_row_slice(2, 1, &[0.1, 0.2]);
        assert!(initial_tolerance(&distances, 3).is_err());
    }

    #[test]
    fn generation_one_requires_univariate_distance() {
        let distances = DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.3, 0.4]);
        assert!(initial_tolerance(&distances, 1).is_err());
    }

    #[test]
    fn stopping_rule_fires_once_q_t_high_and_generation_at_least_three() {
        let points = |v: &[f64]| v.iter().map(|&x| DVector::from_vec(vec![x])).collect::<Vec<_>>();
        let current = points(&[0.1, 0.1, 0.1, 0.1, 0.1]);
        let previous = points(&[0.1, 0.1, 0.1, 0.1, 0.1]);
        let result = next_tolerance(&current, &previous, &[0.1; 5], 3, 3, 1).unwrap();
        // Identical clouds -> r(x) is roughly 1 everywhere -> q_t ~ 1 -> stop at g >= 3.
        assert!(result.is_none());
    }

    #[test]
    fn stopping_rule_does_not_fire_before_generation_three() {
        let points = |v: &[f64]| v.iter().map(|&x| DVector::from_vec(vec![x])).collect::<Vec<_>>();
        let current = points(&[0.1, 0.1, 0.1, 0.1, 0.1]);
        let previous = points(&[0.1, 0.1, 0.1, 0.1, 0.1]);
        let result = next_tolerance(&current, &previous, &[0.1; 5], 3, 2, 1).unwrap();
        assert!(result.is_some());
    }
}
