//! Site Prober CLI
//!
//! Runs the producer (scheduler + prober + publisher) and the consumer as
//! separate processes sharing only the database-backed bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use site_prober::{
    bus::{MessageBus, PgBus},
    error::Result,
    models::{Config, ConfigOrigin},
    services::{ResultConsumer, ResultPublisher, Scheduler},
    storage::{ConfigSource, FileConfigSource, PgStore, SitesFile, postgres},
};

/// Site Prober - website liveness and content monitor
#[derive(Parser, Debug)]
#[command(
    name = "site-prober",
    version,
    about = "Probe websites and record their health"
)]
struct Cli {
    /// Path to the configuration file (default: prober.toml, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe all configured sites periodically and publish the results
    Produce {
        /// Seconds between cycles (overrides prober.interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Read sites and rules from a TOML file instead of the database
        #[arg(long)]
        sites: Option<PathBuf>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Consume published results into the database
    Consume,

    /// Create the database tables used by the prober and the bus
    InitDb,

    /// Validate the configuration and, optionally, a sites file
    Validate {
        /// Sites file to check
        #[arg(long)]
        sites: Option<PathBuf>,
    },
}

const DEFAULT_CONFIG: &str = "prober.toml";

/// Initialize logging: `-v`, then `RUST_LOG`, then the configured level.
fn init_logging(verbose: bool, configured: &str) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(configured));
    if verbose {
        builder.parse_filters("debug");
    }
    builder.format_timestamp_secs().init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // An explicit path must load; the default path may be absent.
    let loaded = match &cli.config {
        Some(path) => Config::load(path).map(|config| (config, ConfigOrigin::File(path.clone()))),
        None => Config::load_if_present(DEFAULT_CONFIG),
    };

    let level = match &loaded {
        Ok((config, _)) => config.logging.level.as_str(),
        Err(_) => "info",
    };
    init_logging(cli.verbose, level);

    log::info!("Site prober starting...");

    let (mut config, origin) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            let path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
            log::error!("Failed to load config from {}: {}", path.display(), e);
            return Err(e);
        }
    };
    match &origin {
        ConfigOrigin::File(path) => log::info!("Loaded configuration from {}", path.display()),
        ConfigOrigin::Defaults => {
            log::warn!("No {} found, using built-in defaults", DEFAULT_CONFIG);
        }
    }

    config.apply_env();
    config.validate()?;

    match cli.command {
        Command::Produce {
            interval,
            sites,
            once,
        } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.prober.interval());

            let pool = postgres::connect(&config.database).await?;
            let bus: Arc<dyn MessageBus> = Arc::new(PgBus::new(pool.clone(), &config.bus));
            let source: Arc<dyn ConfigSource> = match sites {
                Some(path) => {
                    let file_source = FileConfigSource::new(path);
                    log::info!("Reading sites from {}", file_source.path().display());
                    Arc::new(file_source)
                }
                None => Arc::new(PgStore::new(pool)),
            };

            let publisher = Arc::new(ResultPublisher::new(bus, &config.bus));
            let scheduler = Scheduler::new(Arc::new(config), source, Arc::clone(&publisher));

            if once {
                let report = scheduler.run_cycle().await?;
                println!("{report:#?}");
                return Ok(());
            }

            tokio::select! {
                result = scheduler.run(interval) => result?,
                _ = tokio::signal::ctrl_c() => {
                    log::info!(
                        "Interrupted: {} published, {} dropped",
                        publisher.stats().published(),
                        publisher.stats().dropped()
                    );
                }
            }
        }

        Command::Consume => {
            let pool = postgres::connect(&config.database).await?;
            let bus = PgBus::new(pool.clone(), &config.bus);
            let store = Arc::new(PgStore::new(pool));

            let mut consumer = ResultConsumer::subscribe(&bus, &config.bus.topic, store).await?;

            tokio::select! {
                result = consumer.run() => {
                    result?;
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Interrupted");
                }
            }

            let stats = consumer.stats();
            log::info!(
                "Consumer stopped: {} persisted, {} dead-lettered",
                stats.persisted,
                stats.dead_lettered
            );
        }

        Command::InitDb => {
            let pool = postgres::connect(&config.database).await?;
            PgStore::new(pool.clone()).ensure_schema().await?;
            PgBus::new(pool, &config.bus).ensure_schema().await?;
            log::info!("Schema ready");
        }

        Command::Validate { sites } => {
            log::info!("✓ Config OK ({})", origin);

            if let Some(path) = sites {
                let file = SitesFile::read(&path).await?;
                if let Err(e) = file.validate() {
                    log::error!("Sites file validation failed: {}", e);
                    return Err(e);
                }
                log::info!(
                    "✓ Sites OK ({} sites, {} rules)",
                    file.sites.len(),
                    file.rules.len()
                );
            }

            log::info!("All validations passed!");
        }
    }

    log::info!("Done!");

    Ok(())
}
