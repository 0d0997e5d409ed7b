//! A named, ordered collection of independent univariate priors bound to a
//! single parameter space (spec §3, §4.2). Binding to exactly one
//! `ParameterTarget` at the type level makes "mixing gdata and ldata names in
//! one set" unrepresentable rather than a runtime check.

use abcsmc_common::{Error, ParameterTarget, Result};
use abcsmc_math::PriorDist;
use nalgebra::DVector;

#[derive(Debug, Clone)]
pub struct PriorSet {
    names: Vec<String>,
    dists: Vec<PriorDist>,
    target: ParameterTarget,
}

impl PriorSet {
    /// Builds a prior set, validating each distribution's own parameters and
    /// rejecting duplicate names.
    pub fn new(entries: Vec<(String, PriorDist)>, target: ParameterTarget) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::PriorSet("a PriorSet must bind at least one parameter".into()));
        }
        let mut names = Vec::with_capacity(entries.len());
        let mut dists = Vec::with_capacity(entries.len());
        for (name, dist) in entries {
            dist.validate().map_err(Error::PriorSet)?;
            if names.contains(&name) {
                return Err(Error::PriorSet(format!("duplicate prior name: {name:?}")));
            }
            names.push(name);
            dists.push(dist);
        }
        Ok(PriorSet { names, dists, target })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn target(&self) -> ParameterTarget {
        self.target
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dists(&self) -> &[PriorDist] {
        &self.dists
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Joint log prior density `sum_j log pi_j(x_j)` over all `k`
    /// parameters; `f64::NEG_INFINITY` if any component is out of support.
    pub fn log_density(&self, x: &DVector<f64>) -> f64 {
        debug_assert_eq!(x.len(), self.dists.len());
        self.dists.iter().zip(x.iter()).map(|(dist, &xi)| dist.log_pdf(xi)).sum()
    }

    /// Joint prior density `pi(x) = prod_j pi_j(x_j)`.
    pub fn density(&self, x: &DVector<f64>) -> f64 {
        let log_density = self.log_density(x);
        if log_density == f64::NEG_INFINITY {
            0.0
        } else {
            log_density.exp()
        }
    }

    /// Whether every component of `x` lies within its prior's support.
    pub fn support_contains(&self, x: &DVector<f64>) -> bool {
        debug_assert_eq!(x.len(), self.dists.len());
        self.dists.iter().zip(x.iter()).all(|(dist, &xi)| dist.support_contains(xi))
    }

    /// Validates the bound parameter names resolve against the simulator's
    /// namespace sizes (spec §4.2: "resolved against either gdata names or
    /// ldata row-names").
    pub fn validate_against(&self, gdata_len: usize, ldata_rows: usize) -> Result<()> {
        let namespace_size = match self.target {
            ParameterTarget::GData => gdata_len,
            ParameterTarget::LData => ldata_rows,
        };
        if self.names.len() > namespace_size {
            return Err(Error::PriorSet(format!(
                "{} priors bound but only {namespace_size} slots in {:?}",
                self.names.len(),
                self.target
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> PriorSet {
        PriorSet::new(
            vec![
                ("beta".to_string(), PriorDist::Uniform { a: 0.0, b: 1.0 }),
                ("gamma".to_string(), PriorDist::Uniform { a: 0.0, b: 2.0 }),
            ],
            ParameterTarget::GData,
        )
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_names() {
        let entries = vec![
            ("beta".to_string(), PriorDist::Uniform { a: 0.0, b: 1.0 }),
            ("beta".to_string(), PriorDist::Uniform { a: 0.0, b: 1.0 }),
        ];
        assert!(PriorSet::new(entries, ParameterTarget::GData).is_err());
    }

    #[test]
    fn rejects_invalid_distribution_parameters() {
        let entries = vec![("beta".to_string(), PriorDist::Uniform { a: 1.0, b: 0.0 })];
        assert!(PriorSet::new(entries, ParameterTarget::GData).is_err());
    }

    #[test]
    fn joint_density_is_product_of_marginals() {
        let priors = set();
        let x = DVector::from_vec(vec![0.5, 1.0]);
        let expected = priors.dists()[0].pdf(0.5) * priors.dists()[1].pdf(1.0);
        assert!((priors.density(&x) - expected).abs() < 1e-12);
    }

    #[test]
    fn out_of_support_point_has_zero_density() {
        let priors = set();
        let x = DVector::from_vec(vec![-1.0, 1.0]);
        assert!(!priors.support_contains(&x));
        assert_eq!(priors.density(&x), 0.0);
    }

    #[test]
    fn validate_against_checks_namespace_size() {
        let priors = set();
        assert!(priors.validate_against(2, 0).is_ok());
        assert!(priors.validate_against(1, 0).is_err());
    }
}
