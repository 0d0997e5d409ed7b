//! End-to-end tests for loading a run's external inputs: the scheduled-event
//! CSV, the prior-clause sequence, and the TOML/JSON engine configuration.

use abcsmc_config::{parse_sequence, read_csv, EngineConfig, RawEventKind, RawTime};
use abcsmc_math::PriorDist;

const EVENT_CSV: &str = "\
event,time,node,dest,n,proportion,select,shift
enter,2020-01-01,1,0,10,0,1,1
exit,2020-01-05,1,0,0,0.1,1,1
";

#[test]
fn reads_mixed_label_and_date_event_rows() {
    let rows = read_csv(EVENT_CSV).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].event, RawEventKind::Label("enter".into()));
    assert!(matches!(rows[0].time, RawTime::Date(_)));
    assert_eq!(rows[1].n, 0);
    assert!((rows[1].proportion - 0.1).abs() < 1e-12);
}

#[test]
fn prior_sequence_feeds_directly_into_prior_dist_values() {
    let priors = parse_sequence("beta ~ uniform(0, 1)\ngamma ~ gamma(2, 5)\n").unwrap();
    assert_eq!(priors.len(), 2);
    assert_eq!(priors[0].dist, PriorDist::Uniform { a: 0.0, b: 1.0 });
    assert_eq!(priors[1].dist, PriorDist::Gamma { shape: 2.0, rate: 5.0 });
}

#[test]
fn adaptive_engine_config_round_trips_through_toml_and_json() {
    let toml_source = "n_particles = 200\nn_init = 1000\nfailure_budget_per_generation = 500\n";
    let config = EngineConfig::from_toml_str(toml_source).unwrap();
    assert_eq!(config.n_particles, 200);
    assert!(config.is_adaptive());

    let json_source = serde_json::to_string(&config).unwrap();
    let round_tripped = EngineConfig::from_json_str(&json_source).unwrap();
    assert_eq!(round_tripped.n_particles, config.n_particles);
    assert_eq!(round_tripped.n_init, config.n_init);
}

#[test]
fn scheduled_config_rejects_a_non_decreasing_row() {
    let toml_source = "\
n_particles = 50
tolerance_schedule = [[1.0, 1.0, 0.2]]
";
    assert!(EngineConfig::from_toml_str(toml_source).is_err());
}

#[test]
fn config_and_n_init_are_mutually_exclusive() {
    let toml_source = "\
n_particles = 50
n_init = 500
tolerance_schedule = [[1.0, 0.5]]
";
    assert!(EngineConfig::from_toml_str(toml_source).is_err());
}
