//! Integration Tests Module
//!
//! End-to-end tests for labctl through its public API: scheduling scenarios,
//! fatal-phase halting, sequential parity, and full workspace runs that load
//! `labctl.toml`, execute real commands and write reports.

// Scheduler, sequential executor and aggregation scenarios
mod orchestrator_test;

// Workspace configuration, command executors and report files
mod workspace_test;
