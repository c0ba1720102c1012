//! Workspace Path Utilities
//!
//! Resolves the configuration file, report directory and report file names
//! relative to a workspace root.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::utils::error::AppResult;

/// Default workspace configuration file name
pub const CONFIG_FILE_NAME: &str = "labctl.toml";

/// Default report directory, relative to the workspace root
pub const DEFAULT_OUTPUT_DIR: &str = "reports";

/// Default config file location for a workspace.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Report file stem for a run: `labctl-YYYYmmdd-HHMMSS-<run id prefix>`.
///
/// The run id prefix keeps runs started within the same second apart.
pub fn report_stem(started_at: DateTime<Utc>, run_id: &str) -> String {
    let short: String = run_id.chars().filter(|c| *c != '-').take(8).collect();
    format!("labctl-{}-{}", started_at.format("%Y%m%d-%H%M%S"), short)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_against() {
        let root = Path::new("/ws");
        assert_eq!(resolve_against(root, Path::new("out")), PathBuf::from("/ws/out"));
        assert_eq!(resolve_against(root, Path::new("/tmp/out")), PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_report_stem() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            report_stem(at, "3f2a9c41-0b7e-4d2a-9e1f-55aa00bb11cc"),
            "labctl-20240309-140507-3f2a9c41"
        );
        assert_ne!(
            report_stem(at, "3f2a9c41-0b7e-4d2a-9e1f-55aa00bb11cc"),
            report_stem(at, "77c0d1e2-0b7e-4d2a-9e1f-55aa00bb11cc")
        );
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }
}
