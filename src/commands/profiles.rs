//! `labctl profiles`

use std::fmt::Write as _;
use std::path::Path;

use labctl_orchestrator::{host_parallelism, ProfileCatalog};

use crate::storage::config::ConfigService;
use crate::utils::error::AppResult;

pub fn execute(workspace: &Path, config: Option<&Path>) -> AppResult<i32> {
    let service = ConfigService::load(workspace, config)?;
    let catalog = service.profile_catalog()?;
    print!("{}", render(&catalog, host_parallelism())?);
    Ok(0)
}

/// One line per profile with its resolved settings.
pub fn render(catalog: &ProfileCatalog, host_parallelism: usize) -> AppResult<String> {
    let mut out = String::new();
    for name in catalog.names() {
        let config = catalog.resolve_with_parallelism(name, host_parallelism)?;
        let description = catalog
            .get(name)
            .and_then(|spec| spec.description.as_deref())
            .unwrap_or("");
        let _ = writeln!(
            out,
            "{:<12} max_concurrency={:<3} batch_size={:<3} timeout={}s retries={} verbosity={}  {}",
            name,
            config.max_concurrency,
            config.batch_size,
            config.timeout_per_unit_secs,
            config.retry_count,
            config.verbosity,
            description
        );
    }
    Ok(out)
}
