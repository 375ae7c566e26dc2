//! # Deployment
//!
//! Entry point of the engine: [`deploy`] validates targets and parameters,
//! assembles the command tree, holds the deployment lock while the tree runs,
//! rolls back on failure and records every result.
//!
//! Collaborators outside the engine are reached through the traits in
//! [`interfaces`], carried by the explicit [`RuntimeContext`].

pub mod assembly;
pub mod context;
pub mod deploy;
pub mod in_process;
pub mod interfaces;
pub mod remote;

pub use assembly::{create_cmd_from_orchestration, AssemblyInput};
pub use context::{RuntimeContext, RuntimeContextBuilder};
pub use deploy::{deploy, DeployOptions, DeploymentError, DeploymentOutcome};
pub use in_process::{InProcessLock, MemoryCatalog, MemorySink, StaticRoutes};
pub use interfaces::{
    DistributedLock, ExecutionSink, LockError, LockHandle, LockRequest, OrchestrationCatalog,
    OrchestrationExecutionRecord, RemoteCommandTransport, Route, RouteResolver,
    StepExecutionRecord, TransportError,
};
pub use remote::execute_remote_request;
