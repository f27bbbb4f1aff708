use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use log::LevelFilter;

use pbvolume_api::constants::DRIVER_CONFIG_PATH_DEFAULT;

use crate::PBVOLUME_VERSION;

#[derive(Parser, Debug)]
#[clap(version = PBVOLUME_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Debug)]
    pub verbosity: LevelFilter,

    /// Driver configuration file
    #[arg(global = true, short, long, default_value = DRIVER_CONFIG_PATH_DEFAULT)]
    pub config: PathBuf,

    /// Write metric events as JSON lines to this file
    #[arg(global = true, long)]
    pub metrics_file: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Serve volume plugin calls read as JSON lines from stdin
    Serve,

    /// Check the configuration and print the resolved driver parameters
    Validate,

    /// Print the block devices currently visible, as seen by device resolution
    Devices,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Serve => "serve",
            Commands::Validate => "validate",
            Commands::Devices => "devices",
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}
