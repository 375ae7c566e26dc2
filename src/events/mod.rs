//! Lifecycle events broadcast while deployments run.
//!
//! Event names live in [`crate::constants::events`].

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};
