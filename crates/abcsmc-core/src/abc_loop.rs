//! Orchestrates the generation loop (spec §4.10): proposal, simulate,
//! distance, accept, weight, tolerance-update, until the schedule is
//! exhausted or the adaptive stopping rule fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::distance::{Distance, DistanceAdapter};
use crate::tolerance::{initial_tolerance, next_tolerance};
use crate::particle_store::{Generation, ParticleStore};
use crate::prior_set::PriorSet;
use crate::proposal::{kernel_covariance, Proposal, ProposalSampler};
use crate::simulator::SimulatorHandle;
use crate::weight::WeightUpdater;
use abcsmc_common::{Error, ParameterTarget, Result};

/// Cooperative cancellation, polled between trajectories/batches (spec §5).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fires this token after `timeout_seconds` on a background timer
    /// thread (spec §5's "timeouts are expressed as wall-clock deadlines on
    /// the same token").
    pub fn with_deadline(timeout_seconds: f64) -> Self {
        let token = CancellationToken::new();
        let waiter = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs_f64(timeout_seconds.max(0.0)));
            waiter.cancel();
        });
        token
    }
}

/// Applied before each proposal's `run` (spec §6). Forbidden when the
/// parameter target is `ldata`.
pub trait InitModel: Send + Sync {
    fn apply(&self, handle: &mut dyn SimulatorHandle) -> Result<()>;
}

impl<F> InitModel for F
where
    F: Fn(&mut dyn SimulatorHandle) -> Result<()> + Send + Sync,
{
    fn apply(&self, handle: &mut dyn SimulatorHandle) -> Result<()> {
        self(handle)
    }
}

/// A read-only view of one just-committed generation, handed to `post_gen`.
pub struct GenerationSnapshot<'a> {
    pub generation_index: usize,
    pub generation: &'a Generation,
}

pub trait PostGen: Send + Sync {
    fn call(&self, snapshot: &GenerationSnapshot);
}

impl<F> PostGen for F
where
    F: Fn(&GenerationSnapshot) + Send + Sync,
{
    fn call(&self, snapshot: &GenerationSnapshot) {
        self(snapshot)
    }
}

/// Particle counts, the failure budget, and the RNG seed for one `run`
/// invocation.
#[derive(Debug, Clone, Copy)]
pub struct AbcLoopConfig {
    pub n_particles: usize,
    pub failure_budget_per_generation: usize,
    pub seed: u64,
}

/// Either an explicit `S`-length tolerance per generation, or adaptive
/// selection from `n_init` (spec §4.9).
pub enum ToleranceMode {
    Schedule(Vec<DVector<f64>>),
    Adaptive { n_init: usize },
}

/// Owns the committed-generation history, the bound priors, and the
/// simulator handle. All mutation happens through `AbcLoop` (spec §3).
pub struct AbcState<H: SimulatorHandle + Clone> {
    priors: PriorSet,
    store: ParticleStore,
    handle: H,
    init_model: Option<Box<dyn InitModel>>,
}

impl<H: SimulatorHandle + Clone> AbcState<H> {
    pub fn new(priors: PriorSet, handle: H, init_model: Option<Box<dyn InitModel>>) -> Result<Self> {
        if priors.target() == ParameterTarget::LData && init_model.is_some() {
            return Err(Error::Config(
                "init_model is forbidden when the parameter target is ldata".into(),
            ));
        }
        Ok(AbcState { priors, store: ParticleStore::new(), handle, init_model })
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn priors(&self) -> &PriorSet {
        &self.priors
    }
}

fn row_within_tolerance(row: &[f64], eps: &DVector<f64>) -> bool {
    row.iter().zip(eps.iter()).all(|(d, e)| d <= e)
}

fn distance_row(d: &DMatrix<f64>, row: usize) -> Vec<f64> {
    (0..d.ncols()).map(|col| d[(row, col)]).collect()
}

fn apply_gdata(handle: &mut dyn SimulatorHandle, values: &DVector<f64>) -> Result<()> {
    for (i, v) in values.iter().enumerate() {
        handle.set_gdata(i, *v)?;
    }
    Ok(())
}

/// Applies one proposal's values to a handle regardless of target, used for
/// the adaptive oversample phase where no per-node batching happens yet.
fn apply_single_proposal(
    handle: &mut dyn SimulatorHandle,
    target: ParameterTarget,
    values: &DVector<f64>,
) -> Result<()> {
    match target {
        ParameterTarget::GData => apply_gdata(handle, values),
        ParameterTarget::LData => {
            for (i, v) in values.iter().enumerate() {
                handle.set_ldata(i, 0, *v)?;
            }
            Ok(())
        }
    }
}

fn rows_as_vectors(m: &DMatrix<f64>) -> Vec<DVector<f64>> {
    (0..m.nrows()).map(|r| m.row(r).transpose()).collect()
}

/// Drives one run of the generation loop against a borrowed `AbcState`.
pub struct AbcLoop<'s, 'd, H: SimulatorHandle + Clone + Sync> {
    state: &'s mut AbcState<H>,
    distance: DistanceAdapter<'d>,
    config: AbcLoopConfig,
    tolerance: ToleranceMode,
    cancellation: CancellationToken,
    post_gen: Option<Box<dyn PostGen>>,
    data: Value,
    schedule_offset: usize,
    pending_adaptive_eps: Option<DVector<f64>>,
}

impl<'s, 'd, H: SimulatorHandle + Clone + Sync> AbcLoop<'s, 'd, H> {
    pub fn new(
        state: &'s mut AbcState<H>,
        distance: &'d dyn Distance,
        tolerance: ToleranceMode,
        config: AbcLoopConfig,
        cancellation: CancellationToken,
        post_gen: Option<Box<dyn PostGen>>,
        data: Value,
    ) -> Result<Self> {
        let is_adaptive = matches!(tolerance, ToleranceMode::Adaptive { .. });
        let schedule_offset = state.store.len();
        Ok(AbcLoop {
            state,
            distance: DistanceAdapter::new(distance, is_adaptive),
            config,
            tolerance,
            cancellation,
            post_gen,
            data,
            schedule_offset,
            pending_adaptive_eps: None,
        })
    }

    fn emit_post_gen(&self, generation_index: usize) {
        if let Some(cb) = &self.post_gen {
            let generation = self.state.store.last().expect("just committed");
            cb.call(&GenerationSnapshot { generation_index, generation });
        }
    }

    /// Runs the full generation loop: a fresh fit if `state` has no
    /// committed generations yet, or a `continue_abc`-style resume
    /// otherwise.
    pub fn run(mut self) -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        if self.state.store.is_empty() {
            let oversample_pool = self.run_first_generation(&mut rng)?;
            if let Some(oversample_pool) = oversample_pool {
                // Generation 0 is the unfiltered oversample pool: KLIEP
                // compares it against generation 1's accepted particles to
                // derive ε^(2), the same mechanism every later generation
                // uses against its immediate predecessor.
                let gen1 = self.state.store.last().expect("just committed");
                let xnu = rows_as_vectors(&gen1.x);
                let xde = rows_as_vectors(&oversample_pool);
                let summed: Vec<f64> =
                    (0..gen1.d.nrows()).map(|row| distance_row(&gen1.d, row).iter().sum()).collect();
                let next = next_tolerance(&xnu, &xde, &summed, self.config.n_particles, 1, self.config.seed)?
                    .expect("generation_index 1 never satisfies the stopping rule");
                self.pending_adaptive_eps = Some(DVector::from_vec(vec![next]));
            }
        }

        loop {
            let generation_index = self.state.store.len() + 1;
            let eps = match &self.tolerance {
                ToleranceMode::Schedule(schedule) => {
                    match schedule.get(generation_index - 1 - self.schedule_offset) {
                        Some(e) => e.clone(),
                        None => break,
                    }
                }
                ToleranceMode::Adaptive { .. } => match self.pending_adaptive_eps.take() {
                    Some(e) => e,
                    None => break,
                },
            };

            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.run_generation(generation_index, eps)?;
            self.emit_post_gen(generation_index);

            if matches!(self.tolerance, ToleranceMode::Adaptive { .. }) && self.state.store.len() >= 2 {
                let len = self.state.store.len();
                let current = self.state.store.get(len - 1).expect("just pushed");
                let previous = self.state.store.get(len - 2).expect("bootstrap generation exists");
                let xnu = rows_as_vectors(&current.x);
                let xde = rows_as_vectors(&previous.x);
                let summed: Vec<f64> = (0..current.d.nrows())
                    .map(|row| distance_row(&current.d, row).iter().sum())
                    .collect();
                match next_tolerance(
                    &xnu,
                    &xde,
                    &summed,
                    self.config.n_particles,
                    generation_index,
                    self.config.seed,
                )? {
                    Some(value) => self.pending_adaptive_eps = Some(DVector::from_vec(vec![value])),
                    None => {
                        info!(generation_index, "adaptive stopping rule fired");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs generation 1. Returns the unfiltered oversample pool when
    /// adaptive tolerance selection produced one, so the caller can bootstrap
    /// ε^(2) from it.
    fn run_first_generation(&mut self, rng: &mut ChaCha8Rng) -> Result<Option<DMatrix<f64>>> {
        match &self.tolerance {
            ToleranceMode::Schedule(schedule) => {
                let eps = schedule
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::Config("tolerance schedule has no rows".into()))?;
                self.run_generation(1, eps)?;
                Ok(None)
            }
            ToleranceMode::Adaptive { n_init } => {
                let n_init = *n_init;
                let (candidates_x, candidates_d, nprop) = self.collect_oversample(n_init, rng)?;
                let (tolerance_scalar, selected) =
                    initial_tolerance(&candidates_d, self.config.n_particles)?;
                let x = candidates_x.select_rows(&selected);
                let d = candidates_d.select_rows(&selected);
                let eps = DVector::from_vec(vec![tolerance_scalar]);
                let w = WeightUpdater::initial_weights(x.nrows());
                let ancestors = vec![0; x.nrows()];
                let generation = Generation::new(x, w, d, eps, nprop, ancestors)?;
                self.state.store.push_generation(generation)?;
                Ok(Some(candidates_x))
            }
        }
    }

    /// Generation 1's adaptive oversample: `n_init` independent prior draws,
    /// simulated and scored but not yet filtered by tolerance.
    fn collect_oversample(
        &mut self,
        n_init: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>, u64)> {
        let sampler = ProposalSampler::new(&self.state.priors);
        let proposals: Vec<Proposal> = (0..n_init).map(|_| sampler.propose_initial(rng)).collect();
        let handle = self.state.handle.clone();
        let init_model = &self.state.init_model;
        let target = self.state.priors.target();

        let trajectories: Vec<Result<_>> = proposals
            .par_iter()
            .map(|proposal| {
                let mut local = handle.clone();
                if let Some(init) = init_model {
                    init.apply(&mut local)?;
                }
                apply_single_proposal(&mut local, target, &proposal.values)?;
                local.run()
            })
            .collect();

        let k = self.state.priors.len();
        let mut x_rows = Vec::with_capacity(n_init);
        let mut d_rows: Vec<Vec<f64>> = Vec::with_capacity(n_init);
        let mut nprop = 0u64;
        let mut s_fixed = None;
        for (proposal, trajectory) in proposals.into_iter().zip(trajectories) {
            nprop += 1;
            let trajectory = trajectory?;
            let d = self.distance.evaluate(&trajectory, 1, &self.data)?;
            let s = d.ncols();
            if s_fixed.is_none() {
                s_fixed = Some(s);
            }
            x_rows.push(proposal.values);
            d_rows.push(distance_row(&d, 0));
        }
        let s = s_fixed.unwrap_or(1);
        let mut x = DMatrix::zeros(n_init, k);
        let mut d = DMatrix::zeros(n_init, s);
        for (i, row) in x_rows.iter().enumerate() {
            for j in 0..k {
                x[(i, j)] = row[j];
            }
        }
        for (i, row) in d_rows.iter().enumerate() {
            for sidx in 0..s {
                d[(i, sidx)] = row[sidx];
            }
        }
        Ok((x, d, nprop))
    }

    fn run_generation(&mut self, generation_index: usize, eps: DVector<f64>) -> Result<()> {
        let previous = self.state.store.last().cloned();
        let kernel_cov = previous.as_ref().map(|p| kernel_covariance(&p.x));

        let (x, d, ancestors, nprop) = match self.state.priors.target() {
            ParameterTarget::GData => self.collect_generation_gdata(
                generation_index,
                &eps,
                previous.as_ref().zip(kernel_cov.as_ref()),
            )?,
            ParameterTarget::LData => self.collect_generation_ldata(
                generation_index,
                &eps,
                previous.as_ref().zip(kernel_cov.as_ref()),
            )?,
        };

        let w = match (&previous, &kernel_cov) {
            (Some(prev), Some(cov)) => {
                WeightUpdater::update_weights(&self.state.priors, &x, &prev.x, &prev.w, cov)
            }
            _ => WeightUpdater::initial_weights(x.nrows()),
        };

        let generation = Generation::new(x, w, d, eps, nprop, ancestors)?;
        info!(
            generation_index,
            nprop,
            ess = generation.ess,
            accepted = generation.x.nrows(),
            "generation committed"
        );
        self.state.store.push_generation(generation)
    }

    #[allow(clippy::type_complexity)]
    fn collect_generation_gdata(
        &mut self,
        generation_index: usize,
        eps: &DVector<f64>,
        previous: Option<(&Generation, &DMatrix<f64>)>,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>, Vec<usize>, u64)> {
        let n_particles = self.config.n_particles;
        let k = self.state.priors.len();
        let s = eps.len();
        let sampler = ProposalSampler::new(&self.state.priors);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed ^ generation_index as u64);

        let mut accepted_x: Vec<DVector<f64>> = Vec::with_capacity(n_particles);
        let mut accepted_d: Vec<Vec<f64>> = Vec::with_capacity(n_particles);
        let mut accepted_ancestors: Vec<usize> = Vec::with_capacity(n_particles);
        let mut nprop = 0u64;
        let mut failures = 0usize;

        while accepted_x.len() < n_particles {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let remaining = n_particles - accepted_x.len();
            let chunk = remaining.max(1);
            let mut proposals: Vec<Proposal> = Vec::with_capacity(chunk);
            for _ in 0..chunk {
                match previous {
                    None => proposals.push(sampler.propose_initial(&mut rng)),
                    Some((prev, cov)) => match sampler.propose_perturbed(&prev.x, &prev.w, cov, &mut rng) {
                        Ok(proposal) => proposals.push(proposal),
                        Err(_) => {
                            failures += 1;
                            if failures > self.config.failure_budget_per_generation {
                                return Err(Error::FailureBudgetExceeded {
                                    generation: generation_index,
                                    attempts: failures,
                                });
                            }
                        }
                    },
                }
            }

            let handle = self.state.handle.clone();
            let init_model = &self.state.init_model;
            let trajectories: Vec<Result<_>> = proposals
                .par_iter()
                .map(|proposal| {
                    let mut local = handle.clone();
                    if let Some(init) = init_model {
                        init.apply(&mut local)?;
                    }
                    apply_gdata(&mut local, &proposal.values)?;
                    local.run()
                })
                .collect();

            for (proposal, trajectory) in proposals.into_iter().zip(trajectories) {
                nprop += 1;
                let trajectory = match trajectory {
                    Ok(t) => t,
                    Err(_) => {
                        failures += 1;
                        if failures > self.config.failure_budget_per_generation {
                            return Err(Error::FailureBudgetExceeded {
                                generation: generation_index,
                                attempts: failures,
                            });
                        }
                        continue;
                    }
                };
                if accepted_x.len() >= n_particles {
                    continue;
                }
                let d = self.distance.evaluate(&trajectory, generation_index, &self.data)?;
                let row = distance_row(&d, 0);
                debug!(generation_index, nprop, ?row, "candidate evaluated");
                if row_within_tolerance(&row, eps) {
                    accepted_x.push(proposal.values);
                    accepted_d.push(row);
                    accepted_ancestors.push(proposal.ancestor.unwrap_or(0));
                }
            }
        }

        let mut x = DMatrix::zeros(n_particles, k);
        let mut d = DMatrix::zeros(n_particles, s);
        for (i, row) in accepted_x.iter().enumerate() {
            for j in 0..k {
                x[(i, j)] = row[j];
            }
        }
        for (i, row) in accepted_d.iter().enumerate() {
            for sidx in 0..s {
                d[(i, sidx)] = row[sidx];
            }
        }
        Ok((x, d, accepted_ancestors, nprop))
    }

    #[allow(clippy::type_complexity)]
    fn collect_generation_ldata(
        &mut self,
        generation_index: usize,
        eps: &DVector<f64>,
        previous: Option<(&Generation, &DMatrix<f64>)>,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>, Vec<usize>, u64)> {
        const INITIAL_BATCH_MULTIPLIER: usize = 10;
        const MAX_BATCH: usize = 100_000;

        let n_particles = self.config.n_particles;
        let k = self.state.priors.len();
        let s = eps.len();
        let sampler = ProposalSampler::new(&self.state.priors);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed ^ generation_index as u64);

        let mut batch_n = (n_particles * INITIAL_BATCH_MULTIPLIER).min(MAX_BATCH).max(1);
        let mut accepted_x: Vec<DVector<f64>> = Vec::with_capacity(n_particles);
        let mut accepted_d: Vec<Vec<f64>> = Vec::with_capacity(n_particles);
        let mut accepted_ancestors: Vec<usize> = Vec::with_capacity(n_particles);
        let mut nprop = 0u64;
        let mut failures = 0usize;

        while accepted_x.len() < n_particles {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut proposals: Vec<Proposal> = Vec::with_capacity(batch_n);
            let mut batch_build_failed = false;
            for _ in 0..batch_n {
                match previous {
                    None => proposals.push(sampler.propose_initial(&mut rng)),
                    Some((prev, cov)) => match sampler.propose_perturbed(&prev.x, &prev.w, cov, &mut rng) {
                        Ok(proposal) => proposals.push(proposal),
                        Err(_) => {
                            batch_build_failed = true;
                            break;
                        }
                    },
                }
            }
            if batch_build_failed {
                failures += 1;
                if failures > self.config.failure_budget_per_generation {
                    return Err(Error::FailureBudgetExceeded {
                        generation: generation_index,
                        attempts: failures,
                    });
                }
                continue;
            }

            let mut handle = self.state.handle.clone();
            handle.replicate_first_node(batch_n)?;
            for (node, proposal) in proposals.iter().enumerate() {
                for (i, value) in proposal.values.iter().enumerate() {
                    handle.set_ldata(i, node, *value)?;
                }
            }

            let trajectory = match handle.run() {
                Ok(t) => t,
                Err(_) => {
                    failures += 1;
                    if failures > self.config.failure_budget_per_generation {
                        return Err(Error::FailureBudgetExceeded {
                            generation: generation_index,
                            attempts: failures,
                        });
                    }
                    continue;
                }
            };
            let d = self.distance.evaluate(&trajectory, generation_index, &self.data)?;

            for (node, proposal) in proposals.into_iter().enumerate() {
                nprop += 1;
                if accepted_x.len() >= n_particles {
                    continue;
                }
                let row = distance_row(&d, node);
                if row_within_tolerance(&row, eps) {
                    accepted_x.push(proposal.values);
                    accepted_d.push(row);
                    accepted_ancestors.push(proposal.ancestor.unwrap_or(0));
                }
            }

            if nprop > 2 * batch_n as u64 {
                batch_n = (batch_n * 2).min(MAX_BATCH);
            }
        }

        let mut x = DMatrix::zeros(n_particles, k);
        let mut d = DMatrix::zeros(n_particles, s);
        for (i, row) in accepted_x.iter().enumerate() {
            for j in 0..k {
                x[(i, j)] = row[j];
            }
        }
        for (i, row) in accepted_d.iter().enumerate() {
            for sidx in 0..s {
                d[(i, sidx)] = row[sidx];
            }
        }
        Ok((x, d, accepted_ancestors, nprop))
    }
}

trait SelectRows {
    fn select_rows(&self, indices: &[usize]) -> Self;
}

impl SelectRows for DMatrix<f64> {
    fn select_rows(&self, indices: &[usize]) -> Self {
        let mut out = DMatrix::zeros(indices.len(), self.ncols());
        for (i, &src) in indices.iter().enumerate() {
            out.set_row(i, &self.row(src));
        }
        out
    }
}

impl<H: SimulatorHandle + Clone + Sync> AbcState<H> {
    /// `continue_abc`: resumes a fit with an additional, strictly-decreasing
    /// tolerance schedule (spec §4.10, §6).
    pub fn continue_with(
        &mut self,
        new_tolerance_schedule: Vec<DVector<f64>>,
        distance: &dyn Distance,
        config: AbcLoopConfig,
        cancellation: CancellationToken,
        post_gen: Option<Box<dyn PostGen>>,
        data: Value,
    ) -> Result<()> {
        if let Some(last) = self.store.last() {
            let mut reference = last.eps.clone();
            for (col, eps) in new_tolerance_schedule.iter().enumerate() {
                if eps.len() != reference.len() {
                    return Err(Error::ToleranceShapeMismatch {
                        expected_s: reference.len(),
                        actual_s: eps.len(),
                    });
                }
                for s in 0..eps.len() {
                    if !(eps[s] < reference[s]) {
                        return Err(Error::ToleranceNotDecreasing { row: s, col });
                    }
                }
                reference = eps.clone();
            }
        }
        let loop_ = AbcLoop::new(
            self,
            distance,
            ToleranceMode::Schedule(new_tolerance_schedule),
            config,
            cancellation,
            post_gen,
            data,
        )?;
        loop_.run()
    }
}
