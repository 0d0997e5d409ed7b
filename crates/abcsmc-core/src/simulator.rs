//! The external simulator contract (spec §4.4). The engine treats the
//! simulator as an opaque capability: it writes parameter slots, asks for a
//! trajectory, and never inspects what comes back — only the caller's
//! `distance` function does. Mirrors the `ParticleFilter` trait boundary the
//! localization module draws around its own external state update.

use abcsmc_common::Result;
use serde_json::Value;

/// One simulated trajectory. Opaque to the engine; only meaningful to the
/// caller's `distance` implementation.
#[derive(Debug, Clone)]
pub struct Trajectory(Value);

impl Trajectory {
    pub fn new(value: Value) -> Self {
        Trajectory(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// A compiled simulator model: parameter slots plus the ability to run one
/// stochastic trajectory and to replicate its first node for per-node
/// parallelism (spec §4.4, §5).
///
/// The handle is consumed, not owned, by any single caller — the engine may
/// hold multiple parallel clones when the parameter target is `gdata`.
pub trait SimulatorHandle: Send {
    /// Writes a scalar into the global parameter vector `gdata` at `index`.
    fn set_gdata(&mut self, index: usize, value: f64) -> Result<()>;

    /// Writes a scalar into the per-node parameter matrix `ldata` at
    /// `(index, column)`.
    fn set_ldata(&mut self, index: usize, column: usize, value: f64) -> Result<()>;

    /// Executes one stochastic trajectory with the handle's current
    /// parameters.
    fn run(&self) -> Result<Trajectory>;

    /// Clones column 0 of `u0`, `v0`, and `ldata` `n` times in place, packing
    /// `n` particles into a single trajectory's nodes (spec §4.4, §5). Event
    /// replication itself is handled separately by `ReplicationAdapter`,
    /// since events belong to the `EventTable`, not the handle.
    fn replicate_first_node(&mut self, n: usize) -> Result<()>;

    /// Number of compartments/rows in `gdata`, for bounds-checked proposal
    /// application.
    fn gdata_len(&self) -> usize;

    /// Number of rows in `ldata` (one per compartment), for bounds-checked
    /// proposal application.
    fn ldata_rows(&self) -> usize;
}
