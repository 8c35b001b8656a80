use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use valhalla_bridge_cli::args::{parse_coordinate, CostingArg, RebuildArg, UnitsArg};
use valhalla_bridge_cli::logging::{init_logging, LogFormat};
use valhalla_bridge_cli::output::render_outcome;
use valhalla_bridge_lib::{
    default_archive_source, CancellationToken, Coordinate, EngineConfig, EngineRelease, Location,
    LogProgress, PathExporter, Provisioner, RouteClient, RouteOptions, SetupOutcome,
    SystemCommandRunner,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Provision a local Valhalla engine and request routes")]
struct Cli {
    /// Override the cache directory holding the engine install and tiles.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Engine release version to install.
    #[arg(long, global = true)]
    engine_version: Option<String>,

    /// Base URL of the engine release repository.
    #[arg(long, global = true)]
    release_base: Option<String>,

    /// Install whatever release is currently marked latest.
    #[arg(long, global = true)]
    latest: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether the engine is installed and current.
    Status,
    /// Download and install the routing engine.
    Setup,
    /// Compute a route over an exported dataset.
    Route {
        /// Dataset file in an engine-readable format (e.g. .osm.pbf).
        #[arg(long)]
        dataset: PathBuf,
        /// Start as LAT,LON.
        #[arg(long = "from", value_parser = parse_coordinate, allow_hyphen_values = true)]
        from: Coordinate,
        /// Destination as LAT,LON.
        #[arg(long = "to", value_parser = parse_coordinate, allow_hyphen_values = true)]
        to: Coordinate,
        /// Intermediate stop as LAT,LON. Repeatable.
        #[arg(long = "via", value_parser = parse_coordinate, allow_hyphen_values = true)]
        via: Vec<Coordinate>,
        #[arg(long, value_enum, default_value_t = CostingArg::Auto)]
        costing: CostingArg,
        #[arg(long, value_enum, default_value_t = UnitsArg::Miles)]
        units: UnitsArg,
        #[arg(long, value_enum, default_value_t = RebuildArg::Always)]
        rebuild: RebuildArg,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = resolve_config(&cli)?;
    debug!(
        cache_root = %config.cache_root.display(),
        version = %config.engine_version,
        "resolved engine configuration"
    );

    match cli.command {
        Command::Status => handle_status(config),
        Command::Setup => handle_setup(config),
        Command::Route {
            dataset,
            from,
            to,
            via,
            costing,
            units,
            rebuild,
            json,
        } => {
            let mut stops = Vec::with_capacity(via.len() + 2);
            stops.push(from);
            stops.extend(via);
            stops.push(to);
            let options = RouteOptions {
                costing: costing.into(),
                units: units.into(),
            };
            handle_route(config, dataset, &stops, options, rebuild, json)
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("failed to resolve engine configuration")?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_root = dir.clone();
    }
    if let Some(version) = &cli.engine_version {
        config = config.with_engine_version(version.clone());
    }
    if let Some(base) = &cli.release_base {
        config = config.with_release_base(base.clone());
    }
    if cli.latest {
        config = config.with_release(EngineRelease::Latest);
    }
    Ok(config)
}

fn provisioner(config: EngineConfig) -> Result<Provisioner> {
    let archives = default_archive_source().context("failed to create release downloader")?;
    Ok(Provisioner::new(config, archives))
}

fn handle_status(config: EngineConfig) -> Result<()> {
    let provisioner = provisioner(config)?;
    let config = provisioner.config();
    println!("Routing engine: {}", provisioner.state());
    println!("Engine version: {} ({})", config.engine_version, config.release);
    println!("Platform: {}", config.platform);
    println!("Cache: {}", config.layout().routing_dir().display());
    Ok(())
}

fn handle_setup(config: EngineConfig) -> Result<()> {
    let provisioner = provisioner(config)?;
    let outcome = provisioner
        .perform_setup(&LogProgress, &CancellationToken::new())
        .context("routing engine setup failed")?;

    let config = provisioner.config();
    let install_dir = config.layout().install_dir();
    match outcome {
        SetupOutcome::Installed => println!(
            "Installed {} {} at {}",
            config.engine_name,
            config.engine_version,
            install_dir.display()
        ),
        SetupOutcome::AlreadyCurrent => println!(
            "{} {} is already installed at {}",
            config.engine_name,
            config.engine_version,
            install_dir.display()
        ),
    }
    Ok(())
}

fn handle_route(
    config: EngineConfig,
    dataset: PathBuf,
    stops: &[Coordinate],
    options: RouteOptions,
    rebuild: RebuildArg,
    json: bool,
) -> Result<()> {
    let client = RouteClient::new(provisioner(config)?, Arc::new(SystemCommandRunner))
        .with_options(options)
        .with_rebuild_policy(rebuild.into());
    let locations: Vec<Location> = stops.iter().copied().map(Location::from).collect();

    let outcome = client
        .generate_route(
            &PathExporter,
            dataset.as_path(),
            &locations,
            &LogProgress,
            &CancellationToken::new(),
        )
        .with_context(|| format!("failed to route over {}", dataset.display()))?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&outcome).context("failed to serialise route outcome")?;
        println!("{rendered}");
    } else {
        print!("{}", render_outcome(&outcome, options.units));
    }
    Ok(())
}
