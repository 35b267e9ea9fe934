//! CLI command implementations.

pub mod build;
pub mod cache;
pub mod common;
pub mod estimate;
