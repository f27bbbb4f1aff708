use std::{path::Path, process::Command};

use anyhow::{Context, Error};
use uuid::Uuid;

use crate::exe::RunAndCheck;

/// Creates a filesystem on the device. When a UUID is given and the
/// filesystem is from the ext family, the filesystem is created with that
/// UUID.
pub fn run(device_path: &Path, filesystem: &str, uuid: Option<&Uuid>) -> Result<(), Error> {
    command(device_path, filesystem, uuid)
        .run_and_check()
        .context("Failed to execute mkfs")
}

fn command(device_path: &Path, filesystem: &str, uuid: Option<&Uuid>) -> Command {
    let mut command = Command::new("mkfs");
    command.arg("--type").arg(filesystem);

    if let Some(uuid) = uuid.filter(|_| supports_uuid(filesystem)) {
        command.arg("-U").arg(uuid.hyphenated().to_string());
    }

    command.arg(device_path);
    command
}

fn supports_uuid(filesystem: &str) -> bool {
    matches!(filesystem, "ext2" | "ext3" | "ext4")
}
