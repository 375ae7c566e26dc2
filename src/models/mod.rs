//! # Workflow Model
//!
//! Orchestrations, their steps and the action templates steps inherit from.
//!
//! - [`Orchestration`] - versioned DAG of steps with build-time invariants
//! - [`Step`] - do/undo node with tri-state error policy overrides
//! - [`ActionTemplate`] / [`ActionSpec`] - reusable and resolved action definitions
//! - [`StepSchema`] / [`OrchestrationSchema`] - parameter contracts
//! - [`Server`] / [`TargetMapping`] - deployment targets

pub mod action_template;
pub mod errors;
pub mod orchestration;
pub mod schema;
pub mod server;
pub mod step;

use uuid::Uuid;

pub type StepId = Uuid;
pub type ServerId = Uuid;
pub type OrchestrationId = Uuid;

pub use action_template::{ActionSpec, ActionTemplate, ActionType};
pub use errors::{GraphError, GraphResult};
pub use orchestration::Orchestration;
pub use schema::{OrchestrationSchema, StepSchema};
pub use server::{Server, TargetMapping};
pub use step::{resolve, resolve_flag, Step};
