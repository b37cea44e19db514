// Subcommand handlers. main.rs parses arguments and dispatches here.

pub mod info;
pub mod route;
pub mod snap;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use trailmesh_lib::{load_network, RouteAssembler, RoutingConfig};

/// Load configuration from `path` (or defaults) and apply `TRAILMESH_*` overrides.
pub fn load_config(path: Option<&Path>) -> Result<RoutingConfig> {
    let config = match path {
        Some(path) => RoutingConfig::from_path(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => RoutingConfig::default(),
    };
    config
        .with_env_overrides()
        .context("invalid TRAILMESH_* environment override")
}

/// Load a network file and build an offline assembler over it.
pub fn load_assembler(path: &Path, config: &RoutingConfig) -> Result<Arc<RouteAssembler>> {
    let features = load_network(path, &config.modes_property)
        .with_context(|| format!("failed to load network from {}", path.display()))?;
    Ok(Arc::new(RouteAssembler::from_features(
        &features,
        config.clone(),
    )))
}
