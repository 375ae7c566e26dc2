//! End-to-end deployment scenarios

pub mod flow;
pub mod nested;
pub mod remote;
pub mod validation;
