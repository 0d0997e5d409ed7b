//! The ABC-SMC inference engine: the scheduled-event table, prior bindings,
//! the simulator contract, and the generation loop that drives them (spec
//! §4).

pub mod abc_loop;
pub mod distance;
pub mod event_table;
pub mod kliep;
pub mod particle_store;
pub mod prior_set;
pub mod proposal;
pub mod replication;
pub mod simulator;
pub mod tolerance;
pub mod weight;

pub use abc_loop::{
    AbcLoop, AbcLoopConfig, AbcState, CancellationToken, GenerationSnapshot, InitModel, PostGen,
    ToleranceMode,
};
pub use distance::{Distance, DistanceAdapter};
pub use event_table::{Event, EventLabelOrigin, EventTable, SelectMatrix, ShiftMatrix, TimeOrigin};
pub use kliep::{DensityRatioModel, KliepEstimator};
pub use particle_store::{Generation, ParticleStore};
pub use prior_set::PriorSet;
pub use proposal::{kernel_covariance, Proposal, ProposalSampler};
pub use replication::ReplicationAdapter;
pub use simulator::{SimulatorHandle, Trajectory};
pub use tolerance::{initial_tolerance, next_tolerance};
pub use weight::WeightUpdater;
