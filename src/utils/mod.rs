//! Shared utilities

pub mod dag;

pub use dag::Dag;
