use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info};

use pbvolume_api::{
    config::DriverConfig,
    constants::CAPABILITY_SCOPE,
    error::{DriverError, DriverResultExt, ErrorKind, Stage},
    plugin::Capability,
};

use crate::{
    cloud::CloudApi,
    devices::SnapshotReader,
    host::HostOps,
    poll::{RetryPolicy, Sleep},
    provision::Provisioner,
    registry::{VolumeRecord, VolumeRegistry},
    removal::Remover,
};

/// Inputs of the orchestrators, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverParams {
    /// Remote identity of this instance, the target of every attach.
    pub server_id: String,

    /// Size of new remote volumes, in GB.
    pub size: u32,

    pub disk_type: String,

    pub filesystem: String,

    /// Volumes are mounted at `<mount_root>/<kernel device name>`.
    pub mount_root: PathBuf,

    pub metadata_root: PathBuf,

    /// Never considered a newly attached device.
    pub boot_device: String,

    pub poll: RetryPolicy,

    pub device_retry: RetryPolicy,
}

impl DriverParams {
    pub fn from_config(config: &DriverConfig, server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            size: config.size,
            disk_type: config.disk_type.clone(),
            filesystem: config.filesystem.clone(),
            mount_root: config.mount_path.clone(),
            metadata_root: config.metadata_path.clone(),
            boot_device: config.boot_device.clone(),
            poll: RetryPolicy::remote_request(),
            device_retry: RetryPolicy::device_resolution(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::from_config(
            &DriverConfig::from_yaml("datacenterId: dc-1\n").unwrap(),
            "srv-1",
        )
    }
}

/// Everything the driver talks to outside its own memory.
pub struct Collaborators {
    pub api: Arc<dyn CloudApi>,
    pub host: Arc<dyn HostOps>,
    pub devices: Arc<dyn SnapshotReader>,
    pub sleeper: Arc<dyn Sleep>,
}

/// Serves the volume lifecycle. Every operation holds the registry lock for
/// its whole duration, remote waits included, so requests never overlap, not
/// even for different volumes.
pub struct VolumeDriver {
    params: DriverParams,
    collaborators: Collaborators,
    registry: Mutex<VolumeRegistry>,
}

impl VolumeDriver {
    pub fn new(params: DriverParams, collaborators: Collaborators) -> Self {
        Self {
            params,
            collaborators,
            registry: Mutex::new(VolumeRegistry::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VolumeRegistry>, DriverError> {
        self.registry
            .lock()
            .map_err(|_| DriverError::internal("Volume registry lock is poisoned"))
    }

    /// Provisions a new volume. A name that is already registered is left as
    /// is.
    pub fn create(&self, name: &str) -> Result<(), DriverError> {
        validate_name(name)?;
        let mut registry = self.lock()?;
        if registry.contains(name) {
            info!("Volume '{name}' already exists, nothing to create");
            return Ok(());
        }

        Provisioner::new(&self.params, &self.collaborators, name)
            .run(&mut registry)
            .message(format!("Failed to create volume '{name}'"))
            .map(|_| ())
    }

    /// Mounts the volume and returns its mount path.
    pub fn mount(&self, name: &str) -> Result<PathBuf, DriverError> {
        let registry = self.lock()?;
        let record = registry.get(name)?;

        debug!(
            "Mounting '{}' at '{}'",
            record.device_path.display(),
            record.mount_path.display()
        );
        self.collaborators
            .host
            .mount(
                &record.device_path,
                &record.mount_path,
                &self.params.filesystem,
            )
            .stage(Stage::Mount)?;

        info!("Mounted volume '{name}'");
        Ok(record.mount_path.clone())
    }

    pub fn unmount(&self, name: &str) -> Result<(), DriverError> {
        let registry = self.lock()?;
        let record = registry.get(name)?;

        self.collaborators
            .host
            .unmount(&record.mount_path)
            .stage(Stage::Unmount)?;

        info!("Unmounted volume '{name}'");
        Ok(())
    }

    /// The record of a registered volume, `None` for an unknown name.
    pub fn get(&self, name: &str) -> Result<Option<VolumeRecord>, DriverError> {
        Ok(self.lock()?.get(name).ok().cloned())
    }

    /// All registered (name, mount path) pairs, ordered by name.
    pub fn list(&self) -> Result<Vec<(String, PathBuf)>, DriverError> {
        Ok(self.lock()?.list())
    }

    pub fn remove(&self, name: &str) -> Result<(), DriverError> {
        let mut registry = self.lock()?;
        Remover::new(&self.params, &self.collaborators)
            .run(&mut registry, name)
            .message(format!("Failed to remove volume '{name}'"))
            .map(|_| ())
    }

    pub fn path(&self, name: &str) -> Result<PathBuf, DriverError> {
        Ok(self.lock()?.get(name)?.mount_path.clone())
    }

    pub fn capabilities(&self) -> Capability {
        Capability {
            scope: CAPABILITY_SCOPE.into(),
        }
    }
}

/// Names end up in the remote display name and as a metadata file name.
fn validate_name(name: &str) -> Result<(), DriverError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(DriverError::new(ErrorKind::InvalidName { name: name.into() }));
    }
    Ok(())
}
