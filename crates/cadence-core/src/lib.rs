//! `cadence-core` — shared data model, configuration and errors.

pub mod config;
pub mod error;
pub mod types;

pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
pub use types::{join_commands, normalize_commands, Execution, Job, NewJob, Trigger};
