//! Route command handler: offline assembly, or a remote service with an
//! optional offline fallback.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use trailmesh_lib::remote::RemoteBackend;
use trailmesh_lib::{
    Coordinate, LegSnapshot, OrsBackend, OsrmBackend, RemoteConfig, RemoteRouter, Route,
    RouteAssembler, RouteOptions, Router,
};

use super::{load_assembler, load_config};
use crate::output::{render_route_text, write_json, OutputFormat};
use crate::terminal::ColorPalette;

/// Arguments for the route command.
#[derive(Debug, Clone)]
pub struct RouteCommandArgs {
    pub network: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub waypoints: Vec<Coordinate>,
    pub mode: String,
    pub osrm_url: Option<String>,
    pub ors_url: Option<String>,
    pub ors_key: Option<String>,
    pub timeout_secs: u64,
    /// Earlier route (GeoJSON Feature) whose legs may be reused.
    pub preserve: Option<PathBuf>,
}

/// Which router answers the request.
enum Backend {
    Osrm(String),
    Ors(String),
    Offline,
}

impl RouteCommandArgs {
    fn backend(&self) -> Backend {
        match (&self.osrm_url, &self.ors_url) {
            (Some(url), _) => Backend::Osrm(url.clone()),
            (None, Some(url)) => Backend::Ors(url.clone()),
            (None, None) => Backend::Offline,
        }
    }

    fn remote_config(&self, url: &str) -> RemoteConfig {
        RemoteConfig::new(url).with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// Handle the route subcommand.
pub async fn handle_route_command(args: &RouteCommandArgs, format: OutputFormat) -> Result<()> {
    if args.waypoints.len() < 2 {
        bail!("at least two --waypoint values are required");
    }
    let config = load_config(args.config.as_deref())?;
    let offline = args
        .network
        .as_deref()
        .map(|path| load_assembler(path, &config))
        .transpose()?;

    let mut options = RouteOptions::new(args.mode.clone());
    if let Some(path) = &args.preserve {
        options = options.with_preserved(load_preserved(path)?);
    }

    let router: Arc<dyn Router> = match args.backend() {
        Backend::Osrm(url) => {
            let backend = OsrmBackend::new(args.remote_config(&url))?;
            with_fallback(RemoteRouter::new(backend, config.clone()), offline)
        }
        Backend::Ors(url) => {
            let mut remote = args.remote_config(&url);
            if let Some(key) = &args.ors_key {
                remote = remote.with_api_key(key.clone());
            }
            let backend = OrsBackend::new(remote)?;
            with_fallback(RemoteRouter::new(backend, config.clone()), offline)
        }
        Backend::Offline => {
            let Some(assembler) = offline else {
                bail!("either --network or a remote service URL is required");
            };
            assembler as Arc<dyn Router>
        }
    };

    info!(router = router.name(), mode = %options.mode, waypoints = args.waypoints.len(), "routing");
    let route = router
        .get_route(&args.waypoints, &options)
        .await
        .with_context(|| format!("routing via {} failed", router.name()))?
        .context("no route returned")?;

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Json => write_json(&mut stdout, &route)?,
        OutputFormat::Text => render_route_text(&mut stdout, &route, &ColorPalette::detect())?,
    }
    Ok(())
}

fn with_fallback<B>(router: RemoteRouter<B>, offline: Option<Arc<RouteAssembler>>) -> Arc<dyn Router>
where
    B: RemoteBackend + 'static,
{
    match offline {
        Some(assembler) => Arc::new(router.with_fallback(assembler)),
        None => Arc::new(router),
    }
}

/// Read a previously written route and split it into reusable legs.
fn load_preserved(path: &Path) -> Result<Vec<LegSnapshot>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read preserved route {}", path.display()))?;
    let route: Route = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a route produced by this tool", path.display()))?;
    Ok(route.to_leg_snapshots())
}
