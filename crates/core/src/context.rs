//! Orchestrator Context
//!
//! A single `OrchestratorContext` is built per invocation and handed by
//! reference to every component (scheduler, sequential executor, reporter).
//! It replaces process-wide registries: run identity, output location,
//! progress observers and the stop flag all live here.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::events::{ProgressEvent, ProgressObserver};

/// Per-run context shared by all orchestration components.
pub struct OrchestratorContext {
    run_id: String,
    workspace_root: PathBuf,
    output_dir: PathBuf,
    profile_name: String,
    started_at: DateTime<Utc>,
    observers: Vec<Arc<dyn ProgressObserver>>,
    /// Set when a stop has been requested (e.g. Ctrl-C).
    stop_requested: Arc<AtomicBool>,
}

impl OrchestratorContext {
    /// Create a new context with a fresh run identifier.
    pub fn new(workspace_root: impl Into<PathBuf>, profile_name: impl Into<String>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            output_dir: workspace_root.join("reports"),
            workspace_root,
            profile_name: profile_name.into(),
            started_at: Utc::now(),
            observers: Vec::new(),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the report output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Register a progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Deliver an event to every registered observer.
    pub fn emit(&self, event: ProgressEvent) {
        tracing::trace!(?event, "progress event");
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    /// Ask the driving loop to stop dispatching new batches.
    ///
    /// Batches already handed to a worker still run to completion.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Handle that can request a stop from another thread or signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }
}

impl std::fmt::Debug for OrchestratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorContext")
            .field("run_id", &self.run_id)
            .field("workspace_root", &self.workspace_root)
            .field("output_dir", &self.output_dir)
            .field("profile_name", &self.profile_name)
            .field("started_at", &self.started_at)
            .field("observers", &self.observers.len())
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseKind;
    use std::sync::Mutex;

    #[test]
    fn test_context_defaults() {
        let ctx = OrchestratorContext::new("/workspace", "ci");
        assert_eq!(ctx.workspace_root(), Path::new("/workspace"));
        assert_eq!(ctx.output_dir(), Path::new("/workspace/reports"));
        assert_eq!(ctx.profile_name(), "ci");
        assert!(!ctx.stop_requested());
        assert_eq!(ctx.run_id().len(), 36);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = OrchestratorContext::new("/w", "ci");
        let b = OrchestratorContext::new("/w", "ci");
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn test_with_output_dir() {
        let ctx = OrchestratorContext::new("/workspace", "ci").with_output_dir("/tmp/out");
        assert_eq!(ctx.output_dir(), Path::new("/tmp/out"));
    }

    #[test]
    fn test_emit_reaches_all_observers() {
        let first = Arc::new(Mutex::new(0usize));
        let second = Arc::new(Mutex::new(0usize));
        let f = Arc::clone(&first);
        let s = Arc::clone(&second);

        let ctx = OrchestratorContext::new("/w", "ci")
            .with_observer(Arc::new(move |_: &ProgressEvent| *f.lock().unwrap() += 1))
            .with_observer(Arc::new(move |_: &ProgressEvent| *s.lock().unwrap() += 1));

        ctx.emit(ProgressEvent::Interrupted {
            phase: PhaseKind::Unit,
        });

        assert_eq!(*first.lock().unwrap(), 1);
        assert_eq!(*second.lock().unwrap(), 1);
    }

    #[test]
    fn test_stop_handle_shares_flag() {
        let ctx = OrchestratorContext::new("/w", "ci");
        let handle = ctx.stop_handle();
        handle.store(true, Ordering::SeqCst);
        assert!(ctx.stop_requested());
    }

    #[test]
    fn test_context_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OrchestratorContext>();
    }
}
