use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    constants::{
        API_URL_DEFAULT, BOOT_DEVICE_DEFAULT, DISK_TYPE_DEFAULT, FILESYSTEM_DEFAULT,
        METADATA_PATH_DEFAULT, MOUNT_PATH_DEFAULT, VOLUME_SIZE_DEFAULT,
    },
    error::{DriverError, InitializationError, ReportError},
};

/// Driver configuration, read once at process start.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DriverConfig {
    /// Remote datacenter that hosts this instance and its volumes.
    pub datacenter_id: String,

    /// Provider credentials. Fields left out are taken from the environment.
    #[serde(default)]
    pub credentials: Credentials,

    /// Base URL of the remote API.
    #[serde(default = "default_api_url")]
    pub api_url: Url,

    /// Size of new remote volumes, in GB.
    #[serde(default = "default_size")]
    pub size: u32,

    /// Storage class of new remote volumes.
    #[serde(default = "default_disk_type")]
    pub disk_type: String,

    /// Directory holding per-volume metadata files.
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// Directory under which volumes get mounted.
    #[serde(default = "default_mount_path")]
    pub mount_path: PathBuf,

    /// Filesystem created on freshly attached devices.
    #[serde(default = "default_filesystem")]
    pub filesystem: String,

    /// Kernel name of the boot disk.
    #[serde(default = "default_boot_device")]
    pub boot_device: String,

    /// Overrides the instance identity read from the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_api_url() -> Url {
    // Constant input, cannot fail.
    Url::parse(API_URL_DEFAULT).unwrap()
}

fn default_size() -> u32 {
    VOLUME_SIZE_DEFAULT
}

fn default_disk_type() -> String {
    DISK_TYPE_DEFAULT.into()
}

fn default_metadata_path() -> PathBuf {
    METADATA_PATH_DEFAULT.into()
}

fn default_mount_path() -> PathBuf {
    MOUNT_PATH_DEFAULT.into()
}

fn default_filesystem() -> String {
    FILESYSTEM_DEFAULT.into()
}

fn default_boot_device() -> String {
    BOOT_DEVICE_DEFAULT.into()
}

impl DriverConfig {
    /// Parses a YAML document and checks the values that serde cannot.
    pub fn from_yaml(contents: &str) -> Result<Self, DriverError> {
        let config: DriverConfig =
            serde_yaml::from_str(contents).structured(InitializationError::ParseConfig)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        if self.datacenter_id.trim().is_empty() {
            return Err(DriverError::new(InitializationError::InvalidConfig(
                "datacenterId must not be empty".into(),
            )));
        }

        if self.size == 0 {
            return Err(DriverError::new(InitializationError::InvalidConfig(
                "size must be at least 1 GB".into(),
            )));
        }

        if !self.metadata_path.is_absolute() || !self.mount_path.is_absolute() {
            return Err(DriverError::new(InitializationError::InvalidConfig(
                "metadataPath and mountPath must be absolute".into(),
            )));
        }

        if self.boot_device.is_empty() || self.boot_device.contains('/') {
            return Err(DriverError::new(InitializationError::InvalidConfig(format!(
                "bootDevice must be a kernel device name, got '{}'",
                self.boot_device
            ))));
        }

        Ok(())
    }
}
