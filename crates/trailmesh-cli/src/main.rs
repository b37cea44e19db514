use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trailmesh_lib::Coordinate;

use trailmesh_cli::commands::{self, route::RouteCommandArgs};
use trailmesh_cli::output::{LogFormat, OutputFormat};
use trailmesh_cli::parse_waypoint;

#[derive(Parser, Debug)]
#[command(author, version, about = "Trail network routing utilities")]
struct Cli {
    /// GeoJSON network file (FeatureCollection of LineStrings).
    #[arg(long, global = true)]
    network: Option<PathBuf>,

    /// JSON routing configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for command results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route through two or more waypoints.
    Route(RouteArgs),
    /// Snap waypoints onto the network.
    Snap(SnapArgs),
    /// Summarize the loaded network.
    Info,
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Waypoint as lng,lat[,ele]; repeat in travel order.
    #[arg(long = "waypoint", short = 'w', value_parser = parse_waypoint, required = true)]
    waypoints: Vec<Coordinate>,

    /// Travel mode used to filter edges.
    #[arg(long, default_value = "foot-hiking")]
    mode: String,

    /// Route through an OSRM service at this base URL.
    #[arg(long, conflicts_with = "ors_url")]
    osrm_url: Option<String>,

    /// Route through an openrouteservice instance at this base URL.
    #[arg(long)]
    ors_url: Option<String>,

    /// API key for openrouteservice.
    #[arg(long, env = "TRAILMESH_ORS_KEY", hide_env_values = true)]
    ors_key: Option<String>,

    /// Remote request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Earlier route output (JSON) whose legs may be reused.
    #[arg(long)]
    preserve: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SnapArgs {
    /// Waypoint as lng,lat[,ele]; may be repeated.
    #[arg(long = "waypoint", short = 'w', value_parser = parse_waypoint, required = true)]
    waypoints: Vec<Coordinate>,

    /// Only snap onto edges usable in this mode (empty for any).
    #[arg(long, default_value = "")]
    mode: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Route(args) => {
            let args = RouteCommandArgs {
                network: cli.network,
                config: cli.config,
                waypoints: args.waypoints,
                mode: args.mode,
                osrm_url: args.osrm_url,
                ors_url: args.ors_url,
                ors_key: args.ors_key,
                timeout_secs: args.timeout_secs,
                preserve: args.preserve,
            };
            commands::route::handle_route_command(&args, cli.format).await
        }
        Command::Snap(args) => {
            let network = cli.network.context("--network is required for snap")?;
            commands::snap::handle_snap_command(
                &network,
                cli.config.as_deref(),
                &args.waypoints,
                &args.mode,
                cli.format,
            )
        }
        Command::Info => {
            let network = cli.network.context("--network is required for info")?;
            commands::info::handle_info_command(&network, cli.config.as_deref(), cli.format)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
}
