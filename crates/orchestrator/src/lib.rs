//! labctl Orchestrator
//!
//! Batch-parallel execution of validation work across modules and phases:
//!
//! - `plan` - Scope to phase mapping and `phases x modules` expansion
//! - `partition` - Fixed-size batching of an ordered unit list
//! - `profile` - Named execution profiles (development, ci, production, debug)
//! - `executor` - The `UnitExecutor` seam and per-phase handler table
//! - `scheduler` - Bounded worker-pool driver with fatal-phase halting
//! - `sequential` - Single-threaded driver and scheduler fallback
//! - `aggregator` - Result accumulation and the aggregate report
//! - `outcome` - Run status, exit codes, partial results

pub mod aggregator;
pub mod executor;
pub mod models;
pub mod outcome;
pub mod partition;
pub mod plan;
pub mod profile;
pub mod scheduler;
pub mod sequential;

mod run_state;

pub use aggregator::{AggregateReport, PhaseSummary, ResultAggregator};
pub use executor::{run_batch, PhaseHandlers, UnitContext, UnitExecutor};
pub use models::{
    Batch, Job, JobState, ModuleDescriptor, Unit, UnitOutcome, UnitResult, DISCRIMINATOR_KEY,
};
pub use outcome::{ExecutionOutcome, FatalPhaseFailure, RunStatus};
pub use partition::partition;
pub use plan::{build_plan, filter_modules, ExecutionPlan, ScopeKind};
pub use profile::{host_parallelism, ExecutionConfig, ProfileCatalog, ProfileSpec, Verbosity};
pub use scheduler::Scheduler;
pub use sequential::SequentialExecutor;
