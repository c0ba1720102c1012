//! labctl Core
//!
//! Foundational types shared by the labctl workspace. This crate has no
//! dependency on the engine or the CLI.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `phase` - Closed set of validation phases (`PhaseKind`)
//! - `context` - Per-run context passed to every component (`OrchestratorContext`)
//! - `events` - Progress events and the observer trait

pub mod context;
pub mod error;
pub mod events;
pub mod phase;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Phases ─────────────────────────────────────────────────────────────
pub use phase::PhaseKind;

// ── Context & Events ───────────────────────────────────────────────────
pub use context::OrchestratorContext;
pub use events::{ProgressEvent, ProgressObserver};
