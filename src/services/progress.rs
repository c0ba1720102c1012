//! Console progress output for interactive runs.

use labctl_core::{ProgressEvent, ProgressObserver};

/// Prints one short line per notable progress event to stderr.
#[derive(Debug, Clone, Default)]
pub struct ConsoleProgress {
    quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_event(&self, event: &ProgressEvent) {
        if self.quiet {
            return;
        }
        if let Some(line) = describe(event) {
            eprintln!("{}", line);
        }
    }
}

/// Human-readable line for an event, if it warrants one.
pub fn describe(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::PhaseStarted {
            phase,
            units,
            batches,
        } => Some(format!(
            "==> {} ({} units in {} batches)",
            phase.display_name(),
            units,
            batches
        )),
        ProgressEvent::BatchDispatched { .. } => None,
        ProgressEvent::JobDrained {
            phase,
            job_id,
            worker_failed,
            passed,
            failed,
        } => Some(format!(
            "    [{}] job {} finished: {} passed, {} failed{}",
            phase,
            job_id,
            passed,
            failed,
            if *worker_failed { " (worker failed)" } else { "" }
        )),
        ProgressEvent::PhaseCompleted {
            phase,
            passed,
            failed,
        } => Some(format!(
            "<== {}: {} passed, {} failed",
            phase.display_name(),
            passed,
            failed
        )),
        ProgressEvent::FallbackEngaged { phase, reason } => Some(format!(
            "    {} running sequentially ({})",
            phase.display_name(),
            reason
        )),
        ProgressEvent::FatalHalt {
            phase,
            failed_units,
        } => Some(format!(
            "!!! {} failed for {} unit(s); remaining phases skipped",
            phase.display_name(),
            failed_units
        )),
        ProgressEvent::Interrupted { phase } => Some(format!(
            "!!! interrupted during {}; waiting for running batches",
            phase.display_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl_core::PhaseKind;

    #[test]
    fn test_describe_skips_dispatch_noise() {
        let event = ProgressEvent::BatchDispatched {
            phase: PhaseKind::Unit,
            job_id: 1,
            units: 10,
            active_jobs: 1,
        };
        assert!(describe(&event).is_none());
    }

    #[test]
    fn test_describe_fatal_halt() {
        let line = describe(&ProgressEvent::FatalHalt {
            phase: PhaseKind::Environment,
            failed_units: 2,
        })
        .unwrap();
        assert!(line.contains("2 unit(s)"));
    }
}
