#![allow(clippy::doc_markdown)] // Allow technical terms like DAG, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Fleet Core Rust
//!
//! Deployment execution engine for multi-server fleets.
//!
//! ## Overview
//!
//! An orchestration is a versioned DAG of forward ("do") steps, each optionally
//! paired with a sub-DAG of compensating ("undo") steps. Deploying an
//! orchestration against a mapping of target groups to servers compiles it into
//! a tree of commands, runs that tree level by level with bounded parallelism,
//! rolls back what succeeded when something fails, and records every result.
//!
//! ## Architecture
//!
//! The engine is layered bottom-up:
//!
//! 1. **Workflow model**: orchestrations and steps with build-time invariants
//! 2. **Action encapsulation**: operations that run one unit of code and
//!    evaluate its success
//! 3. **Task scheduler**: the [`scheduler::AsyncOperator`] with priorities,
//!    a bounded backlog and completion waits
//! 4. **Command hierarchy**: invocable, undoable, idempotent command nodes,
//!    including proxies for steps that run on other servers
//! 5. **Deployment**: assembly of the command tree plus the [`deploy`] entry point
//!
//! Collaborators outside the engine (distributed lock, transport, routing,
//! persistence, orchestration catalog) are traits carried by an explicit
//! [`deployment::RuntimeContext`].
//!
//! ## Module Organization
//!
//! - [`models`] - Orchestrations, steps, action templates, schemas
//! - [`operations`] - Action kinds and the operation registry
//! - [`scheduler`] - Priority task scheduler
//! - [`commands`] - Command hierarchy and remote proxies
//! - [`deployment`] - Assembly, lock handling and the deploy flow
//! - [`config`] - Layered configuration
//! - [`events`] - Lifecycle event publishing
//! - [`logging`] - Structured logging setup
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleet_core::deployment::{deploy, DeployOptions, RuntimeContext};
//! use fleet_core::models::{ActionType, Orchestration, Server, Step, TargetMapping};
//! use fleet_core::operations::Params;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let local = Server::new("node1");
//! let ctx = RuntimeContext::builder(local.clone()).build();
//!
//! let mut orchestration = Orchestration::new("hello", 1);
//! let greet = orchestration.add_step(
//!     Step::new_do().with_action(ActionType::Shell, "echo hello {who}"),
//!     &[],
//!     &[],
//! )?;
//! orchestration.add_step(
//!     Step::new_undo().with_action(ActionType::Shell, "echo bye"),
//!     &[greet],
//!     &[],
//! )?;
//!
//! let mut params = Params::new();
//! params.insert("who".into(), "fleet".into());
//! let target = TargetMapping::from([("all".to_string(), vec![local.id])]);
//!
//! let outcome = deploy(&ctx, &orchestration, params, &target, DeployOptions::default()).await?;
//! println!("success: {:?}", outcome.forward_success);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod commands;
pub mod config;
pub mod constants;
pub mod deployment;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod operations;
pub mod scheduler;
pub mod utils;

pub use commands::{
    Command, CommandError, CommandKey, CompositeCommand, Executable, ProxyCommand,
    ProxyUndoCommand, UndoCommand,
};
pub use config::{
    ConfigManager, ConfigurationError, EventsConfig, ExecutionConfig, FleetConfig, LoggingConfig,
    SchedulerConfig,
};
pub use constants::{system, TaskStatus};
// Re-export constants events with different name to avoid conflict
pub use constants::events as system_events;
pub use deployment::{
    create_cmd_from_orchestration, deploy, DeployOptions, DeploymentError, DeploymentOutcome,
    RuntimeContext,
};
pub use error::{FleetError, Result};
pub use events::{EventPublisher, PublishedEvent};
pub use models::{
    ActionSpec, ActionTemplate, ActionType, GraphError, Orchestration, Server, Step, TargetMapping,
};
pub use operations::{OperationEncapsulation, OperationRegistry, OperationResult};
pub use scheduler::{AsyncOperator, SchedulerError, TaskOptions};
