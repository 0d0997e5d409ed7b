//! Error taxonomy for the ABC-SMC engine.
//!
//! Mirrors the five failure modes of spec §7: construction, simulation,
//! distance, tolerance, and cancellation. Codes are stable and grouped by
//! category so callers can match on `category()` without depending on the
//! exact variant set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ABC-SMC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// `EventTable`/`PriorSet` schema or invariant violations.
    Construction,
    /// A simulator trajectory failed.
    Simulation,
    /// The user `distance` callback returned an invalid value.
    Distance,
    /// A supplied tolerance schedule is invalid.
    Tolerance,
    /// The run was cancelled via the cooperative cancellation token.
    Cancelled,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Construction => write!(f, "construction"),
            ErrorCategory::Simulation => write!(f, "simulation"),
            ErrorCategory::Distance => write!(f, "distance"),
            ErrorCategory::Tolerance => write!(f, "tolerance"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Unified error type for the ABC-SMC engine.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Construction errors (10-19)
    #[error("event table error: {0}")]
    EventTable(String),

    #[error("prior parse error: {0}")]
    PriorParse(String),

    #[error("prior set error: {0}")]
    PriorSet(String),

    #[error("invalid engine configuration: {0}")]
    Config(String),

    // Simulation errors (20-29)
    #[error("simulation failed: {0}")]
    Simulation(String),

    #[error("simulation failure budget exceeded after {attempts} attempts in generation {generation}")]
    FailureBudgetExceeded { generation: usize, attempts: usize },

    // Distance errors (30-39)
    #[error("distance function returned an invalid value: {0}")]
    Distance(String),

    #[error("distance dimensionality changed: expected S={expected}, got {actual}")]
    DistanceShapeMismatch { expected: usize, actual: usize },

    #[error("adaptive tolerance mode requires a single summary statistic (S=1), got S={actual}")]
    AdaptiveRequiresUnivariate { actual: usize },

    // Tolerance errors (40-49)
    #[error("tolerance schedule is not strictly decreasing at row {row}, column {col}")]
    ToleranceNotDecreasing { row: usize, col: usize },

    #[error("tolerance schedule shape mismatch: expected S={expected_s} rows, got {actual_s}")]
    ToleranceShapeMismatch { expected_s: usize, actual_s: usize },

    #[error("cannot supply both an explicit tolerance schedule and n_init")]
    ToleranceConflictsWithInit,

    #[error("n_init ({n_init}) must exceed n_particles ({n_particles})")]
    InitNotLargerThanParticles { n_init: usize, n_particles: usize },

    // Cancellation (50)
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::EventTable(_) => 10,
            Error::PriorParse(_) => 11,
            Error::PriorSet(_) => 12,
            Error::Config(_) => 13,
            Error::Simulation(_) => 20,
            Error::FailureBudgetExceeded { .. } => 21,
            Error::Distance(_) => 30,
            Error::DistanceShapeMismatch { .. } => 31,
            Error::AdaptiveRequiresUnivariate { .. } => 32,
            Error::ToleranceNotDecreasing { .. } => 40,
            Error::ToleranceShapeMismatch { .. } => 41,
            Error::ToleranceConflictsWithInit => 42,
            Error::InitNotLargerThanParticles { .. } => 43,
            Error::Cancelled => 50,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::EventTable(_) | Error::PriorParse(_) | Error::PriorSet(_) | Error::Config(_) => {
                ErrorCategory::Construction
            }
            Error::Simulation(_) | Error::FailureBudgetExceeded { .. } => ErrorCategory::Simulation,
            Error::Distance(_)
            | Error::DistanceShapeMismatch { .. }
            | Error::AdaptiveRequiresUnivariate { .. } => ErrorCategory::Distance,
            Error::ToleranceNotDecreasing { .. }
            | Error::ToleranceShapeMismatch { .. }
            | Error::ToleranceConflictsWithInit
            | Error::InitNotLargerThanParticles { .. } => ErrorCategory::Tolerance,
            Error::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether the in-progress generation (not the whole run) can simply
    /// retry after this error. Only individual simulation failures are
    /// recoverable in place; everything else unwinds the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Simulation(_))
    }

    /// A short remediation hint for human-facing error formatting; no
    /// color codes, since this crate has no CLI of its own.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::EventTable(_) => "Check column types and value ranges against the scheduled-event schema.",
            Error::PriorParse(_) => "Priors must match `name ~ family(p1, p2)` with family in {uniform,normal,lognormal,gamma}.",
            Error::PriorSet(_) => "A PriorSet's parameters must all target gdata or all target ldata, never both.",
            Error::Config(_) => "Review n_particles, the tolerance schedule (or n_init), and the failure budget.",
            Error::Simulation(_) => "The failing trajectory is discarded and its proposal retried automatically.",
            Error::FailureBudgetExceeded { .. } => "Raise the per-generation failure budget or inspect why the simulator keeps failing.",
            Error::Distance(_) => "distance() must return a non-negative, NaN-free vector or matrix of fixed width S.",
            Error::DistanceShapeMismatch { .. } => "distance() must return the same number of summary statistics on every call.",
            Error::AdaptiveRequiresUnivariate { .. } => "Supply an explicit tolerance schedule when using more than one summary statistic.",
            Error::ToleranceNotDecreasing { .. } => "Each tolerance row must strictly decrease across generations.",
            Error::ToleranceShapeMismatch { .. } => "The tolerance matrix must have exactly S rows, one per summary statistic.",
            Error::ToleranceConflictsWithInit => "Supply either an explicit tolerance schedule or n_init, not both.",
            Error::InitNotLargerThanParticles { .. } => "n_init must oversample strictly more candidates than n_particles.",
            Error::Cancelled => "Already-committed generations remain valid; re-enter with continue_abc if desired.",
        }
    }
}
