pub mod bootstrap;
pub mod cli;
pub mod cloud;
pub mod devices;
pub mod driver;
pub mod host;
pub mod plugin;
pub mod poll;
pub mod provision;
pub mod registry;
pub mod removal;

#[cfg(test)]
mod testutils;

pub use driver::{Collaborators, DriverParams, VolumeDriver};

/// Driver version as provided by environment variables at build time
pub const PBVOLUME_VERSION: &str = match option_env!("PBVOLUME_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
