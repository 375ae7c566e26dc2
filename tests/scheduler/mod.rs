//! Task scheduler tests

pub mod operator;
