//! Command implementations for the Ferrule CLI.

pub mod config;
pub mod metrics;
pub mod predict;
pub mod train;
pub mod types;
