use std::path::{Path, PathBuf};

use anyhow::Error;
use log::debug;
use uuid::Uuid;

use osutils::{files, mkfs, mount};
use pbvolume_api::{
    constants::{METADATA_DIR_MODE, METADATA_FILE_MODE},
    error::{DriverError, LocalIoError, ReportError},
};

/// Local side effects of the volume lifecycle.
pub trait HostOps: Send + Sync {
    /// Creates a filesystem on a freshly attached device.
    fn format(&self, device: &Path, filesystem: &str, volume_id: &str) -> Result<(), DriverError>;

    /// Makes sure the mount directory exists. Calling it again is harmless.
    fn prepare_mount_point(&self, path: &Path) -> Result<(), DriverError>;

    fn mount(&self, device: &Path, path: &Path, filesystem: &str) -> Result<(), DriverError>;

    fn unmount(&self, path: &Path) -> Result<(), DriverError>;

    /// Persists the metadata document of one volume, readable by root only.
    fn write_metadata(&self, path: &Path, contents: &[u8]) -> Result<(), DriverError>;

    fn remove_metadata(&self, path: &Path) -> Result<(), Error>;
}

/// Runs the real OS commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl HostOps for SystemHost {
    fn format(&self, device: &Path, filesystem: &str, volume_id: &str) -> Result<(), DriverError> {
        // Tag the filesystem with the remote id so the device can be traced
        // back to its volume.
        let uuid = Uuid::parse_str(volume_id).ok();
        debug!(
            "Formatting '{}' as {filesystem}{}",
            device.display(),
            if uuid.is_some() { " tagged with volume id" } else { "" }
        );
        mkfs::run(device, filesystem, uuid.as_ref()).structured(LocalIoError::Format {
            device: device.display().to_string(),
        })
    }

    fn prepare_mount_point(&self, path: &Path) -> Result<(), DriverError> {
        mount::ensure_mount_directory(path).structured(LocalIoError::CreateMountDirectory {
            path: path.display().to_string(),
        })
    }

    fn mount(&self, device: &Path, path: &Path, filesystem: &str) -> Result<(), DriverError> {
        mount::mount(device, path, filesystem).structured(LocalIoError::Mount {
            device: device.display().to_string(),
            path: path.display().to_string(),
        })
    }

    fn unmount(&self, path: &Path) -> Result<(), DriverError> {
        mount::umount(path).structured(LocalIoError::Unmount {
            path: path.display().to_string(),
        })
    }

    fn write_metadata(&self, path: &Path, contents: &[u8]) -> Result<(), DriverError> {
        let write = || -> Result<(), Error> {
            if let Some(dir) = path.parent() {
                files::create_dirs_mode(dir, METADATA_DIR_MODE)?;
            }
            files::write_file(path, METADATA_FILE_MODE, contents)
        };
        write().structured(LocalIoError::WriteMetadata {
            path: path.display().to_string(),
        })
    }

    fn remove_metadata(&self, path: &Path) -> Result<(), Error> {
        files::remove_file_if_exists(path)
    }
}

/// Metadata file of the volume `name` under `metadata_root`.
pub fn metadata_file(metadata_root: &Path, name: &str) -> PathBuf {
    metadata_root.join(name)
}
