use thiserror::Error;

use crate::commands::CommandError;
use crate::config::ConfigurationError;
use crate::deployment::{DeploymentError, LockError, TransportError};
use crate::models::GraphError;
use crate::operations::OperationError;
use crate::scheduler::SchedulerError;

/// Top-level error for callers that do not care which layer failed
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FleetError>;
