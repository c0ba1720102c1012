//! Storage Layer
//!
//! Workspace configuration loading and module discovery.

pub mod config;

pub use config::*;
