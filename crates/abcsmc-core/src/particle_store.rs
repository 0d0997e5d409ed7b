//! One committed generation of accepted particles, and the history of all
//! committed generations. Spec §9's redesign note replaces "a single
//! `N_p x k x G` array grown by concatenation" with a `Vec<Generation>`
//! (O(1) `push_generation`) plus on-demand tensor-view accessors.

use abcsmc_common::Error;
use abcsmc_common::Result;
use nalgebra::{DMatrix, DVector};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// One generation's accepted-particle history (spec §3).
#[derive(Debug, Clone)]
pub struct Generation {
    /// `N_p x k` particle values.
    pub x: DMatrix<f64>,
    /// Length-`N_p` normalized weights, summing to 1.
    pub w: DVector<f64>,
    /// `N_p x S` distance matrix.
    pub d: DMatrix<f64>,
    /// Length-`S` tolerance vector this generation was accepted against.
    pub eps: DVector<f64>,
    /// Effective sample size `1 / sum(w_i^2)`.
    pub ess: f64,
    /// Count of proposals evaluated (accepted + rejected) to produce this
    /// generation.
    pub nprop: u64,
    /// For each accepted particle, its ancestor's row index in the
    /// *previous* generation (meaningless, left empty, for generation 0).
    pub ancestors: Vec<usize>,
}

impl Generation {
    /// Validates the invariants from spec §3/§8: weights non-negative and
    /// normalized, `ess` consistent with the weights, distances within
    /// tolerance for every accepted particle, and matching shapes.
    pub fn new(
        x: DMatrix<f64>,
        w: DVector<f64>,
        d: DMatrix<f64>,
        eps: DVector<f64>,
        nprop: u64,
        ancestors: Vec<usize>,
    ) -> Result<Self> {
        let n_p = x.nrows();
        if w.len() != n_p {
            return Err(Error::Simulation(format!(
                "weight vector has {} entries, expected {n_p}",
                w.len()
            )));
        }
        if d.nrows() != n_p {
            return Err(Error::Simulation(format!(
                "distance matrix has {} rows, expected {n_p}",
                d.nrows()
            )));
        }
        if d.ncols() != eps.len() {
            return Err(Error::DistanceShapeMismatch { expected: eps.len(), actual: d.ncols() });
        }
        if ancestors.len() != n_p {
            return Err(Error::Simulation(format!(
                "ancestor list has {} entries, expected {n_p}",
                ancestors.len()
            )));
        }
        if w.iter().any(|&wi| wi < 0.0 || wi.is_nan()) {
            return Err(Error::Simulation("weights must be non-negative".into()));
        }
        let sum_w: f64 = w.iter().sum();
        if (sum_w - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Simulation(format!("weights sum to {sum_w}, expected 1")));
        }
        for row in 0..n_p {
            for col in 0..eps.len() {
                if d[(row, col)] > eps[col] {
                    return Err(Error::Simulation(format!(
                        "particle {row} has distance {} exceeding tolerance {} on column {col}",
                        d[(row, col)],
                        eps[col]
                    )));
                }
            }
        }
        let ess = 1.0 / w.iter().map(|wi| wi * wi).sum::<f64>();
        Ok(Generation { x, w, d, eps, ess, nprop, ancestors })
    }
}

/// The full committed-generation history plus on-demand 3D tensor views
/// (spec §6's persisted-state shape, §9's redesign note).
#[derive(Debug, Clone, Default)]
pub struct ParticleStore {
    generations: Vec<Generation>,
}

impl ParticleStore {
    pub fn new() -> Self {
        ParticleStore { generations: Vec::new() }
    }

    /// Appends a committed generation, checking that its tolerance is
    /// strictly tighter than the previous generation's (spec §3, §8
    /// invariant 4).
    pub fn push_generation(&mut self, generation: Generation) -> Result<()> {
        if let Some(previous) = self.generations.last() {
            if previous.eps.len() != generation.eps.len() {
                return Err(Error::ToleranceShapeMismatch {
                    expected_s: previous.eps.len(),
                    actual_s: generation.eps.len(),
                });
            }
            for s in 0..generation.eps.len() {
                if !(generation.eps[s] < previous.eps[s]) {
                    return Err(Error::ToleranceNotDecreasing { row: s, col: self.generations.len() });
                }
            }
        }
        self.generations.push(generation);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn last(&self) -> Option<&Generation> {
        self.generations.last()
    }

    pub fn get(&self, generation: usize) -> Option<&Generation> {
        self.generations.get(generation)
    }

    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Materializes the `x` history as one `N_p x k` matrix per generation
    /// (the `N_p x k x G` tensor from spec §6, sliced along `G`).
    pub fn x_tensor(&self) -> Vec<DMatrix<f64>> {
        self.generations.iter().map(|g| g.x.clone()).collect()
    }

    /// Materializes the weight history as an `N_p x G` matrix. Returns
    /// `None` if generations have differing particle counts.
    pub fn weight_matrix(&self) -> Option<DMatrix<f64>> {
        let n_p = self.generations.first()?.w.len();
        if self.generations.iter().any(|g| g.w.len() != n_p) {
            return None;
        }
        let mut matrix = DMatrix::zeros(n_p, self.generations.len());
        for (col, generation) in self.generations.iter().enumerate() {
            matrix.set_column(col, &generation.w);
        }
        Some(matrix)
    }

    /// Materializes the distance history as one `N_p x S` matrix per
    /// generation.
    pub fn distance_tensor(&self) -> Vec<DMatrix<f64>> {
        self.generations.iter().map(|g| g.d.clone()).collect()
    }

    /// The `S x G` tolerance history (spec §3's `ABCState` field).
    pub fn tolerance_history(&self) -> DMatrix<f64> {
        let s = self.generations.first().map(|g| g.eps.len()).unwrap_or(0);
        let mut matrix = DMatrix::zeros(s, self.generations.len());
        for (col, generation) in self.generations.iter().enumerate() {
            matrix.set_column(col, &generation.eps);
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen_with_eps(eps: f64) -> Generation {
        let x = DMatrix::from_row_slice(2, 1, &[0.1, 0.2]);
        let w = DVector::from_vec(vec![0.5, 0.5]);
        let d = DMatrix::from_row_slice(2, 1, &[0.05, 0.05]);
        Generation::new(x, w, d, DVector::from_vec(vec![eps]), 10, vec![0, 1]).unwrap()
    }

    #[test]
    fn ess_matches_weight_formula() {
        let gen = gen_with_eps(0.3);
        assert!((gen.ess - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let x = DMatrix::from_row_slice(1, 1, &[0.1]);
        let w = DVector::from_vec(vec![0.5]);
        let d = DMatrix::from_row_slice(1, 1, &[0.01]);
        assert!(Generation::new(x, w, d, DVector::from_vec(vec![0.1]), 1, vec![0]).is_err());
    }

    #[test]
    fn rejects_distance_exceeding_tolerance() {
        let x = DMatrix::from_row_slice(1, 1, &[0.1]);
        let w = DVector::from_vec(vec![1.0]);
        let d = DMatrix::from_row_slice(1, 1, &[0.5]);
        assert!(Generation::new(x, w, d, DVector::from_vec(vec![0.1]), 1, vec![0]).is_err());
    }

    #[test]
    fn push_generation_enforces_strictly_decreasing_tolerance() {
        let mut store = ParticleStore::new();
        store.push_generation(gen_with_eps(0.3)).unwrap();
        assert!(store.push_generation(gen_with_eps(0.3)).is_err());
        assert!(store.push_generation(gen_with_eps(0.2)).is_ok());
    }

    #[test]
    fn weight_matrix_stacks_generations_with_equal_particle_counts() {
        let mut store = ParticleStore::new();
        store.push_generation(gen_with_eps(0.3)).unwrap();
        store.push_generation(gen_with_eps(0.2)).unwrap();
        let matrix = store.weight_matrix().unwrap();
        assert_eq!(matrix.shape(), (2, 2));
    }
}
