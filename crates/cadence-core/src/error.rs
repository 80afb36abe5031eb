use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A job definition failed a boundary check (no commands, no trigger source, ...).
    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

impl CadenceError {
    /// Short machine-readable code, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            CadenceError::Config(_) => "CONFIG_ERROR",
            CadenceError::InvalidJob(_) => "INVALID_JOB",
        }
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;
