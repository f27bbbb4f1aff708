use std::{
    fs::File,
    io,
    process::ExitCode,
    sync::Mutex,
};

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info};

use pbvolume::{
    bootstrap,
    cli::{Cli, Commands},
    devices::{self, LsblkReader},
    plugin,
};
use pbvolume_api::error::{DriverError, DriverResultExt, ErrorKind, ReportError};

fn run(args: &Cli) -> Result<(), DriverError> {
    // Log version ASAP
    info!("pbvolume version: {}", pbvolume::PBVOLUME_VERSION);

    match args.command {
        Commands::Validate => {
            let config = bootstrap::load_config(&args.config)?;
            let (credentials, params) = bootstrap::resolve(&config)?;
            let summary = serde_yaml::to_string(&bootstrap::Summary::new(
                &config,
                &credentials,
                &params,
            ))
            .structured(ErrorKind::Internal("Failed to render driver parameters"))?;
            print!("{summary}");
            Ok(())
        }

        Commands::Devices => {
            let snapshot = devices::capture(&LsblkReader)?;
            let rendered = serde_json::to_string_pretty(&snapshot)
                .structured(ErrorKind::Internal("Failed to render device snapshot"))?;
            println!("{rendered}");
            Ok(())
        }

        Commands::Serve => {
            let config = bootstrap::load_config(&args.config)?;
            let driver =
                bootstrap::build_driver(&config).message("Failed to initialize the driver")?;

            let stdin = io::stdin();
            let mut stdout = io::stdout();
            plugin::serve(&driver, stdin.lock(), &mut stdout)
                .structured(ErrorKind::Internal("Plugin transport failed"))
        }
    }
}

fn setup_logging(args: &Cli) -> Result<(), Error> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(args.verbosity)
        .try_init()
        .context("Logger already registered")
}

fn setup_tracing(args: &Cli) -> Result<(), Error> {
    use tracing_subscriber::{filter, layer::SubscriberExt, Layer};

    let Some(path) = &args.metrics_file else {
        return Ok(());
    };

    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open metrics file '{}'", path.display()))?;

    let metrics = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(Mutex::new(file))
        .with_filter(filter::LevelFilter::INFO);

    tracing::subscriber::set_global_default(tracing_subscriber::Registry::default().with(metrics))
        .context("Failed to set global default subscriber")
}

fn main() -> ExitCode {
    // Parse args
    let args = Cli::parse();

    // Initialize the loggers
    if let Err(e) = setup_logging(&args) {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    // Initialize the metrics flow
    if let Err(e) = setup_tracing(&args) {
        error!("Failed to initialize tracing: {e:?}");
        return ExitCode::from(1);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command '{}' failed: {e:?}", args.command);
            ExitCode::from(2)
        }
    }
}
