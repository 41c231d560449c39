use std::{future::Future, io::Write, path::Path, sync::Arc};

use tracing::{debug, info};

use crate::{
    bootstrap::Bootstrap,
    config::LaunchConfig,
    domain::ScenarioClass,
    error::{LaunchError, ResolutionError, ValidationError},
    locustfile::{self, ScenarioCatalog},
    stats::RequestStats,
};

/// Run one launch from the process's working directory.
pub async fn launch<W, S>(config: LaunchConfig, out: &mut W, shutdown: S) -> Result<(), LaunchError>
where
    W: Write,
    S: Future<Output = ()>,
{
    let start_dir = std::env::current_dir()?;
    launch_from(config, &start_dir, out, shutdown).await
}

/// Resolve, load and discover relative to `start_dir`, then bring up the topology.
pub async fn launch_from<W, S>(
    config: LaunchConfig,
    start_dir: &Path,
    out: &mut W,
    shutdown: S,
) -> Result<(), LaunchError>
where
    W: Write,
    S: Future<Output = ()>,
{
    if config.display.version {
        writeln!(out, "Locust {}", env!("CARGO_PKG_VERSION"))?;
        return Ok(());
    }

    let catalog = load_catalog(&config.locustfile, start_dir, &config)?;

    if config.display.list {
        write_list(&catalog, out)?;
        return Ok(());
    }
    if config.display.shortlist {
        for name in catalog.names() {
            writeln!(out, "{name}")?;
        }
        return Ok(());
    }

    config.validate_run()?;
    let scenario = select_scenario(&catalog, config.scenario.as_deref())?;
    let running = Bootstrap::new(config, scenario, RequestStats::new())
        .start()
        .await?;
    running.wait(shutdown, out).await
}

fn load_catalog(
    locator: &str,
    start_dir: &Path,
    config: &LaunchConfig,
) -> Result<ScenarioCatalog, LaunchError> {
    let path = locustfile::resolve(locator, start_dir).ok_or_else(|| ResolutionError::NotFound {
        name: locator.to_string(),
    })?;
    debug!(path = %path.display(), "locustfile resolved");

    if !config.search_path.is_empty() {
        locustfile::extend_search_path(config.search_path.iter().cloned());
    }
    let module = locustfile::load_locustfile(&path)?;
    let catalog = locustfile::discover(&module);
    info!(
        locustfile = %path.display(),
        scenarios = catalog.len(),
        "scenarios discovered"
    );
    Ok(catalog)
}

fn write_list<W: Write>(catalog: &ScenarioCatalog, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Available Locusts:")?;
    for (name, class) in catalog.iter() {
        match class.doc().and_then(|doc| doc.lines().next()) {
            Some(summary) if !summary.trim().is_empty() => {
                writeln!(out, "    {name:<24} {}", summary.trim())?
            }
            _ => writeln!(out, "    {name}")?,
        }
    }
    Ok(())
}

fn select_scenario(
    catalog: &ScenarioCatalog,
    requested: Option<&str>,
) -> Result<Arc<ScenarioClass>, ValidationError> {
    let name = requested.ok_or(ValidationError::MissingScenario)?;
    catalog
        .get(name)
        .cloned()
        .ok_or_else(|| ValidationError::UnknownScenario(name.to_string()))
}
