//! Integration-style tests spanning event ingestion, replication, and the
//! full generation loop.

use abcsmc_common::{Error, ParameterTarget, Result};
use abcsmc_config::read_csv;
use abcsmc_core::{
    AbcLoop, AbcLoopConfig, AbcState, CancellationToken, EventTable, PriorSet, ReplicationAdapter,
    SelectMatrix, ShiftMatrix, SimulatorHandle, ToleranceMode, Trajectory,
};
use abcsmc_math::PriorDist;
use nalgebra::{DMatrix, DVector};
use serde_json::{json, Value};

const SCENARIO_2_CSV: &str = "\
event,time,node,dest,n,proportion,select,shift
enter,1,1,0,5,0,1,1
intTrans,2,1,2,3,0,1,1
enter,1,2,0,1,0,1,1
";

#[test]
fn first_node_events_replicate_across_nodes_with_preserved_fields() {
    let raw_rows = read_csv(SCENARIO_2_CSV).unwrap();
    let select = SelectMatrix::new(DMatrix::from_element(1, 1, 1.0), vec!["S".to_string()]).unwrap();
    let shift = ShiftMatrix::new(DMatrix::from_element(1, 1, 1i64), vec!["S".to_string()]).unwrap();
    let table = EventTable::from_raw_rows(raw_rows, select, shift, None).unwrap();

    let replicated = ReplicationAdapter::replicate_events(table.events(), 4).unwrap();

    // Two events are scheduled on node 1 in the source table, replicated 4
    // times each with node offsets 0..4.
    assert_eq!(replicated.len(), 8);
    let nodes: Vec<i64> = replicated.iter().map(|e| e.node).collect();
    for offset in 1..=4 {
        assert_eq!(nodes.iter().filter(|&&n| n == offset).count(), 2);
    }
    // Node 2's own "enter" event is untouched by replication.
    assert_eq!(table.events().iter().filter(|e| e.node == 2).count(), 1);
}

#[derive(Clone)]
struct TwoParamHandle {
    gdata: Vec<f64>,
}

impl SimulatorHandle for TwoParamHandle {
    fn set_gdata(&mut self, index: usize, value: f64) -> Result<()> {
        self.gdata[index] = value;
        Ok(())
    }
    fn set_ldata(&mut self, _index: usize, _column: usize, _value: f64) -> Result<()> {
        Err(Error::Simulation("gdata target only".into()))
    }
    fn run(&self) -> Result<Trajectory> {
        Ok(Trajectory::new(json!({ "beta": self.gdata[0], "gamma": self.gdata[1] })))
    }
    fn replicate_first_node(&mut self, _n: usize) -> Result<()> {
        Err(Error::Simulation("gdata target only".into()))
    }
    fn gdata_len(&self) -> usize {
        self.gdata.len()
    }
    fn ldata_rows(&self) -> usize {
        0
    }
}

fn euclidean_distance(trajectory: &Trajectory, _generation: usize, _data: &Value) -> Result<DMatrix<f64>> {
    let value = trajectory.as_value();
    let beta = value["beta"].as_f64().unwrap();
    let gamma = value["gamma"].as_f64().unwrap();
    let target_beta = 0.4;
    let target_gamma = 0.1;
    let d = ((beta - target_beta).powi(2) + (gamma - target_gamma).powi(2)).sqrt();
    Ok(DMatrix::from_row_slice(1, 1, &[d]))
}

#[test]
fn adaptive_run_shrinks_tolerance_and_terminates() {
    let priors = PriorSet::new(
        vec![
            ("beta".to_string(), PriorDist::Uniform { a: 0.0, b: 1.0 }),
            ("gamma".to_string(), PriorDist::Uniform { a: 0.0, b: 1.0 }),
        ],
        ParameterTarget::GData,
    )
    .unwrap();
    let mut state = AbcState::new(priors, TwoParamHandle { gdata: vec![0.0, 0.0] }, None).unwrap();

    let config = AbcLoopConfig { n_particles: 15, failure_budget_per_generation: 20_000, seed: 11 };
    let loop_ = AbcLoop::new(
        &mut state,
        &euclidean_distance,
        ToleranceMode::Adaptive { n_init: 60 },
        config,
        CancellationToken::new(),
        None,
        Value::Null,
    )
    .unwrap();
    loop_.run().unwrap();

    let history = state.store().tolerance_history();
    assert!(history.ncols() >= 2, "expected at least two committed generations, got {}", history.ncols());
    for col in 1..history.ncols() {
        assert!(
            history[(0, col)] <= history[(0, col - 1)],
            "tolerance must not increase across generations: {:?}",
            history.row(0)
        );
    }
}

#[test]
fn resuming_with_a_looser_schedule_is_rejected() {
    let priors = PriorSet::new(
        vec![("beta".to_string(), PriorDist::Uniform { a: 0.0, b: 1.0 })],
        ParameterTarget::GData,
    )
    .unwrap();
    let mut state = AbcState::new(priors, TwoParamHandle { gdata: vec![0.0, 0.0] }, None).unwrap();
    let config = AbcLoopConfig { n_particles: 5, failure_budget_per_generation: 2000, seed: 3 };
    let loop_ = AbcLoop::new(
        &mut state,
        &euclidean_distance,
        ToleranceMode::Schedule(vec![DVector::from_vec(vec![0.3])]),
        config,
        CancellationToken::new(),
        None,
        Value::Null,
    )
    .unwrap();
    loop_.run().unwrap();

    let result = state.continue_with(
        vec![DVector::from_vec(vec![0.5])],
        &euclidean_distance,
        config,
        CancellationToken::new(),
        None,
        Value::Null,
    );
    assert!(result.is_err());
}
