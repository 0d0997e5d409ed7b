//! The four prior density families spec §3/§9 allows, with a uniform
//! `{pdf, log_pdf, support_contains}` interface (the "dynamically-typed
//! prior descriptor" redesign note: a tagged variant, not an inheritance
//! hierarchy).
//!
//! Sampling lives in `abcsmc-core::proposal`, not here — this crate stays
//! RNG-free, pure density functions only.

use crate::stable::{log_gamma, std_normal_log_pdf};
use serde::{Deserialize, Serialize};

/// A single univariate prior: family plus its two standard parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum PriorDist {
    /// Uniform(a, b), a < b.
    Uniform { a: f64, b: f64 },
    /// Normal(mean, sd), sd > 0.
    Normal { mean: f64, sd: f64 },
    /// LogNormal(mu, sigma) on the log scale, sigma > 0.
    LogNormal { mu: f64, sigma: f64 },
    /// Gamma(shape, rate), both > 0 (rate parameterization, matching
    /// `abcsmc-math::gamma`).
    Gamma { shape: f64, rate: f64 },
}

impl PriorDist {
    /// Validates the family's own parameter constraints (positivity,
    /// ordering) independent of any parameter name or target binding.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            PriorDist::Uniform { a, b } => {
                if !(a.is_finite() && b.is_finite()) {
                    return Err("uniform bounds must be finite".into());
                }
                if a >= b {
                    return Err(format!("uniform requires a < b, got a={a}, b={b}"));
                }
                Ok(())
            }
            PriorDist::Normal { sd, .. } => {
                if !(sd.is_finite() && sd > 0.0) {
                    return Err(format!("normal requires sd > 0, got {sd}"));
                }
                Ok(())
            }
            PriorDist::LogNormal { sigma, .. } => {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(format!("lognormal requires sigma > 0, got {sigma}"));
                }
                Ok(())
            }
            PriorDist::Gamma { shape, rate } => {
                if !(shape.is_finite() && shape > 0.0) {
                    return Err(format!("gamma requires shape > 0, got {shape}"));
                }
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(format!("gamma requires rate > 0, got {rate}"));
                }
                Ok(())
            }
        }
    }

    /// Whether `x` lies in the support of this family.
    pub fn support_contains(&self, x: f64) -> bool {
        if x.is_nan() {
            return false;
        }
        match *self {
            PriorDist::Uniform { a, b } => x >= a && x <= b,
            PriorDist::Normal { .. } => x.is_finite(),
            PriorDist::LogNormal { .. } | PriorDist::Gamma { .. } => x > 0.0,
        }
    }

    /// Log-density at `x`. Returns `f64::NEG_INFINITY` outside the support.
    pub fn log_pdf(&self, x: f64) -> f64 {
        if !self.support_contains(x) {
            return f64::NEG_INFINITY;
        }
        match *self {
            PriorDist::Uniform { a, b } => -(b - a).ln(),
            PriorDist::Normal { mean, sd } => std_normal_log_pdf((x - mean) / sd) - sd.ln(),
            PriorDist::LogNormal { mu, sigma } => {
                let z = (x.ln() - mu) / sigma;
                std_normal_log_pdf(z) - sigma.ln() - x.ln()
            }
            PriorDist::Gamma { shape, rate } => {
                if x == 0.0 {
                    return if shape < 1.0 {
                        f64::INFINITY
                    } else if shape == 1.0 {
                        rate.ln()
                    } else {
                        f64::NEG_INFINITY
                    };
                }
                shape * rate.ln() - log_gamma(shape) + (shape - 1.0) * x.ln() - rate * x
            }
        }
    }

    /// Density at `x`.
    pub fn pdf(&self, x: f64) -> f64 {
        let lp = self.log_pdf(x);
        if lp == f64::NEG_INFINITY {
            0.0
        } else {
            lp.exp()
        }
    }

    /// Inverse CDF (quantile function), required by spec §4.2 only for the
    /// uniform family — used by `beta_inv_cdf`-style bisection elsewhere is
    /// unnecessary here since uniform's inverse CDF is closed-form.
    pub fn inv_cdf(&self, p: f64) -> Option<f64> {
        if !(0.0..=1.0).contains(&p) {
            return None;
        }
        match *self {
            PriorDist::Uniform { a, b } => Some(a + p * (b - a)),
            _ => None,
        }
    }
}
