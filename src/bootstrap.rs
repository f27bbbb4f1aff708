use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};
use serde::Serialize;
use url::Url;

use osutils::{dmi, files};
use pbvolume_api::{
    config::DriverConfig,
    constants::{METADATA_DIR_MODE, PASSWORD_ENV_VAR, PRODUCT_UUID_PATH, USERNAME_ENV_VAR},
    error::{DriverError, InitializationError, ReportError},
};

use crate::{
    cloud::profitbricks::Client,
    devices::LsblkReader,
    driver::{Collaborators, DriverParams, VolumeDriver},
    host::SystemHost,
    poll::ThreadSleep,
};

/// Reads and validates the configuration file.
pub fn load_config(path: &Path) -> Result<DriverConfig, DriverError> {
    let contents = std::fs::read_to_string(path).structured(InitializationError::LoadConfig {
        path: path.display().to_string(),
    })?;
    DriverConfig::from_yaml(&contents)
}

/// Provider credentials after falling back to the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub username: String,
    pub password: String,
}

/// Takes each credential from the configuration, or from its environment
/// variable when the configuration leaves it out.
pub fn resolve_credentials(
    config: &DriverConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedCredentials, DriverError> {
    let pick = |configured: &Option<String>, field: &'static str, env_var: &'static str| {
        configured
            .clone()
            .or_else(|| env(env_var))
            .filter(|value| !value.is_empty())
            .structured(InitializationError::MissingCredential { field, env_var })
    };

    Ok(ResolvedCredentials {
        username: pick(&config.credentials.username, "username", USERNAME_ENV_VAR)?,
        password: pick(&config.credentials.password, "password", PASSWORD_ENV_VAR)?,
    })
}

/// The configured server id, or the platform instance identifier read from
/// `product_uuid_path`.
pub fn resolve_server_id(
    config: &DriverConfig,
    product_uuid_path: &Path,
) -> Result<String, DriverError> {
    if let Some(server_id) = &config.server_id {
        debug!("Using configured server id '{server_id}'");
        return Ok(server_id.clone());
    }

    dmi::product_uuid(product_uuid_path).structured(InitializationError::ReadServerId {
        path: product_uuid_path.display().to_string(),
    })
}

/// Creates the metadata and mount roots.
pub fn prepare_state_directories(config: &DriverConfig) -> Result<(), DriverError> {
    files::create_dirs_mode(&config.metadata_path, METADATA_DIR_MODE).structured(
        InitializationError::CreateStateDirectory {
            path: config.metadata_path.display().to_string(),
        },
    )?;
    files::create_dirs(&config.mount_path).structured(InitializationError::CreateStateDirectory {
        path: config.mount_path.display().to_string(),
    })
}

/// What the driver will run with, as printed by `validate`. Credentials other
/// than the username are left out.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub datacenter_id: String,
    pub api_url: Url,
    pub username: String,
    pub server_id: String,
    pub size: u32,
    pub disk_type: String,
    pub filesystem: String,
    pub boot_device: String,
    pub mount_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl Summary {
    pub fn new(config: &DriverConfig, credentials: &ResolvedCredentials, params: &DriverParams) -> Self {
        Self {
            datacenter_id: config.datacenter_id.clone(),
            api_url: config.api_url.clone(),
            username: credentials.username.clone(),
            server_id: params.server_id.clone(),
            size: params.size,
            disk_type: params.disk_type.clone(),
            filesystem: params.filesystem.clone(),
            boot_device: params.boot_device.clone(),
            mount_path: params.mount_root.clone(),
            metadata_path: params.metadata_root.clone(),
        }
    }
}

/// Resolves everything the driver needs without touching the host.
pub fn resolve(config: &DriverConfig) -> Result<(ResolvedCredentials, DriverParams), DriverError> {
    let credentials = resolve_credentials(config, |var| std::env::var(var).ok())?;
    let server_id = resolve_server_id(config, Path::new(PRODUCT_UUID_PATH))?;
    Ok((credentials, DriverParams::from_config(config, server_id)))
}

/// Builds a driver talking to the real provider and host.
pub fn build_driver(config: &DriverConfig) -> Result<VolumeDriver, DriverError> {
    let (credentials, params) = resolve(config)?;
    prepare_state_directories(config)?;

    let client = Client::new(
        config.api_url.clone(),
        &config.datacenter_id,
        credentials.username,
        credentials.password,
    )
    .structured(InitializationError::ApiClient)?;

    info!(
        "Driver ready for server '{}' in datacenter '{}'",
        params.server_id, config.datacenter_id
    );
    Ok(VolumeDriver::new(
        params,
        Collaborators {
            api: Arc::new(client),
            host: Arc::new(SystemHost),
            devices: Arc::new(LsblkReader),
            sleeper: Arc::new(ThreadSleep),
        },
    ))
}
