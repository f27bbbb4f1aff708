use std::{path::Path, process::Command};

use anyhow::{bail, Context, Error};

use crate::{exe::RunAndCheck, files};

/// Mounts the block device at `path` on `mount_dir`.
pub fn mount(
    path: impl AsRef<Path>,
    mount_dir: impl AsRef<Path>,
    filesystem: &str,
) -> Result<(), Error> {
    mount_command(path.as_ref(), mount_dir.as_ref(), filesystem)
        .run_and_check()
        .context(format!(
            "Failed to mount {} to path {}",
            path.as_ref().display(),
            mount_dir.as_ref().display(),
        ))
}

fn mount_command(path: &Path, mount_dir: &Path, filesystem: &str) -> Command {
    let mut command = Command::new("mount");
    command.arg("-t").arg(filesystem).arg(path).arg(mount_dir);
    command
}

/// Unmounts given directory mount_dir.
pub fn umount(mount_dir: impl AsRef<Path>) -> Result<(), Error> {
    Command::new("umount")
        .arg(mount_dir.as_ref())
        .run_and_check()
        .context(format!(
            "Failed to unmount directory {}",
            mount_dir.as_ref().display()
        ))
}

/// Makes sure a directory exists at `target_path`. An existing directory,
/// empty or not, is accepted as is.
pub fn ensure_mount_directory(target_path: &Path) -> Result<(), Error> {
    if target_path.exists() {
        if !target_path.is_dir() {
            bail!("Mount path '{}' is not a directory", target_path.display());
        }
        return Ok(());
    }

    files::create_dirs(target_path).context(format!(
        "Failed to create mount path '{}'",
        target_path.display()
    ))
}
