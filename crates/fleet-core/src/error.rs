use thiserror::Error;

/// Planner-level failures. Both variants are fatal: no partial plan is
/// ever emitted once one of these is raised.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("completion probe failed: {0}")]
    Probe(String),
}

impl PlanError {
    pub fn config(message: impl Into<String>) -> Self {
        PlanError::Configuration(message.into())
    }

    pub fn probe(message: impl Into<String>) -> Self {
        PlanError::Probe(message.into())
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
