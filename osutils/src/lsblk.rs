use std::process::Command;

use anyhow::{Context, Error};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::exe::RunAndCheck;

/// Columns requested from lsblk, matching the fields of [`BlockDevice`].
const COLUMNS: &str = "NAME,TYPE,MOUNTPOINT,UUID";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LsBlkOutput {
    pub blockdevices: Vec<BlockDevice>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BlockDevice {
    /// Kernel name, e.g. `vdb`.
    pub name: String,

    /// Device type as reported by lsblk: `disk`, `part`, `rom`, `lvm`...
    #[serde(rename = "type")]
    pub device_type: String,

    pub mountpoint: Option<String>,

    /// Filesystem UUID, absent on unformatted devices.
    pub uuid: Option<String>,

    pub children: Option<Vec<BlockDevice>>,
}

impl BlockDevice {
    pub fn is_disk(&self) -> bool {
        self.device_type == "disk"
    }
}

/// Lists every block device visible on the host, with partitions and other
/// dependent devices nested under their parents.
pub fn list() -> Result<Vec<BlockDevice>, Error> {
    let result = Command::new("lsblk")
        .arg("--json")
        .arg("--output")
        .arg(COLUMNS)
        .output_and_check()
        .context("Failed to execute lsblk")?;

    let parsed = parse_lsblk_output(result.as_str());
    if parsed.is_err() {
        warn!("lsblk output: {}", result);
    }

    parsed
}

fn parse_lsblk_output(output: &str) -> Result<Vec<BlockDevice>, Error> {
    let parsed: LsBlkOutput =
        serde_json::from_str(output).context("Failed to parse lsblk output")?;

    Ok(parsed.blockdevices)
}
