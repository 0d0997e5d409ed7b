//! Shared error types and value types for the ABC-SMC inference engine.

pub mod error;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use types::{EventKind, ParameterTarget, PriorFamily};
