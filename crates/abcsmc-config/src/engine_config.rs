//! The engine's run configuration: particle count, tolerance schedule vs.
//! adaptive `n_init` (mutually exclusive per spec §4.9), failure budget, and
//! an optional wall-clock deadline. Schema-first like `pt-core::config`, so
//! callers can validate a TOML/JSON document before constructing an
//! `ABCState`.

use abcsmc_common::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `S x G` tolerance matrix: one row per summary statistic, one column per
/// generation, supplied up front instead of letting the adaptive selector
/// choose it.
pub type ToleranceSchedule = Vec<Vec<f64>>;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Target number of accepted particles per generation (`N_p`).
    pub n_particles: usize,

    /// An explicit `S x G` tolerance schedule. Mutually exclusive with
    /// `n_init`; supplying neither is also an error (spec §4.9 says the
    /// adaptive selector only runs when the caller gave `n_init`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_schedule: Option<ToleranceSchedule>,

    /// Oversampling count for adaptive generation 1 (spec §4.9); must exceed
    /// `n_particles`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_init: Option<usize>,

    /// Per-generation budget of tolerated simulator failures before the run
    /// aborts (spec §7, `SimulationError`).
    #[serde(default = "default_failure_budget")]
    pub failure_budget_per_generation: usize,

    /// Optional wall-clock deadline, in seconds from run start, after which
    /// the cooperative cancellation token is considered fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
}

fn default_failure_budget() -> usize {
    1000
}

impl EngineConfig {
    /// Validates the mutual-exclusion and shape rules from spec §4.9,
    /// returning the same error categories `ABCState::continue_with` raises
    /// at re-entry.
    pub fn validate(&self) -> Result<()> {
        if self.n_particles == 0 {
            return Err(Error::Config("n_particles must be greater than zero".into()));
        }

        match (&self.tolerance_schedule, self.n_init) {
            (Some(_), Some(_)) => return Err(Error::ToleranceConflictsWithInit),
            (None, None) => {
                return Err(Error::Config(
                    "exactly one of tolerance_schedule or n_init must be supplied".into(),
                ))
            }
            (Some(schedule), None) => validate_schedule(schedule)?,
            (None, Some(n_init)) => {
                if n_init <= self.n_particles {
                    return Err(Error::InitNotLargerThanParticles {
                        n_init,
                        n_particles: self.n_particles,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether this config runs in adaptive-tolerance mode.
    pub fn is_adaptive(&self) -> bool {
        self.n_init.is_some()
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(source).map_err(|e| Error::Config(format!("invalid TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(source)
            .map_err(|e| Error::Config(format!("invalid JSON config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_schedule(schedule: &ToleranceSchedule) -> Result<()> {
    if schedule.is_empty() {
        return Err(Error::Config("tolerance_schedule must have at least one row".into()));
    }
    let generations = schedule[0].len();
    for (row_idx, row) in schedule.iter().enumerate() {
        if row.len() != generations {
            return Err(Error::ToleranceShapeMismatch {
                expected_s: schedule.len(),
                actual_s: row.len(),
            });
        }
        for col in 1..row.len() {
            if !(row[col] < row[col - 1]) {
                return Err(Error::ToleranceNotDecreasing { row: row_idx, col });
            }
        }
    }
    Ok(())
}
