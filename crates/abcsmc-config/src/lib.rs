//! External input parsing for the ABC-SMC engine: the prior-clause syntax
//! and scheduled-event table format from spec §6, plus the engine's run
//! configuration. Validated values from this crate feed directly into the
//! constructors in `abcsmc-core`.

pub mod engine_config;
pub mod event_rows;
pub mod prior_syntax;

pub use engine_config::{EngineConfig, ToleranceSchedule};
pub use event_rows::{read_csv, RawEventKind, RawEventRow, RawTime};
pub use prior_syntax::{parse_clause, parse_sequence, NamedPrior};
