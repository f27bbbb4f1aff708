use std::path::PathBuf;

use anyhow::Error;
use log::{debug, info};
use serde::Serialize;

use osutils::lsblk::{self, BlockDevice};
use pbvolume_api::error::{DriverError, ErrorKind, LocalIoError, ReportError};

use crate::poll::{RetryPolicy, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// A whole disk.
    Disk,
    /// A partition or another device stacked on a disk.
    Child,
    /// Anything else listed at the top level (optical drives, loop devices).
    Other,
}

/// One block device as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Kernel name, e.g. `vdc`.
    pub name: String,

    pub kind: DeviceKind,

    /// Empty when the device is not mounted.
    pub mountpoint: String,

    /// Filesystem identifier, when the device carries one.
    pub tag: Option<String>,
}

impl DeviceDescriptor {
    pub fn path(&self) -> PathBuf {
        device_path(&self.name)
    }
}

/// Path of the device node for a kernel device name.
pub fn device_path(name: &str) -> PathBuf {
    PathBuf::from("/dev").join(name)
}

/// Block devices visible at one instant, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeviceSnapshot {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceSnapshot {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self { devices }
    }

    /// Flattens the lsblk device tree: top-level disks keep their kind,
    /// everything nested under another device becomes a child.
    pub fn from_lsblk(devices: &[BlockDevice]) -> Self {
        fn visit(device: &BlockDevice, nested: bool, out: &mut Vec<DeviceDescriptor>) {
            let kind = match (nested, device.is_disk()) {
                (true, _) => DeviceKind::Child,
                (false, true) => DeviceKind::Disk,
                (false, false) => DeviceKind::Other,
            };
            out.push(DeviceDescriptor {
                name: device.name.clone(),
                kind,
                mountpoint: device.mountpoint.clone().unwrap_or_default(),
                tag: device.uuid.clone().filter(|uuid| !uuid.is_empty()),
            });
            for child in device.children.iter().flatten() {
                visit(child, true, out);
            }
        }

        let mut out = Vec::new();
        for device in devices {
            visit(device, false, &mut out);
        }
        Self { devices: out }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.iter().any(|device| device.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Source of device snapshots.
pub trait SnapshotReader: Send + Sync {
    fn snapshot(&self) -> Result<DeviceSnapshot, Error>;
}

/// Reads snapshots from `lsblk`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LsblkReader;

impl SnapshotReader for LsblkReader {
    fn snapshot(&self) -> Result<DeviceSnapshot, Error> {
        Ok(DeviceSnapshot::from_lsblk(&lsblk::list()?))
    }
}

/// Takes a snapshot, reporting failures as local I/O errors.
pub fn capture(reader: &dyn SnapshotReader) -> Result<DeviceSnapshot, DriverError> {
    reader
        .snapshot()
        .structured(LocalIoError::ReadBlockDevices)
}

/// Devices in `after` that can only be the one just attached: new by name,
/// a whole disk, not the boot disk, unmounted and untagged.
pub fn candidates<'a>(
    before: &DeviceSnapshot,
    after: &'a DeviceSnapshot,
    boot_device: &str,
) -> Vec<&'a DeviceDescriptor> {
    after
        .iter()
        .filter(|device| !before.contains(&device.name))
        .filter(|device| device.kind == DeviceKind::Disk)
        .filter(|device| device.name != boot_device)
        .filter(|device| device.mountpoint.is_empty() && device.tag.is_none())
        .collect()
}

/// Finds the local device of a remote volume that was just attached by
/// comparing device snapshots taken before and after the attach.
pub struct DeviceResolver<'a> {
    reader: &'a dyn SnapshotReader,
    sleeper: &'a dyn Sleep,
    policy: RetryPolicy,
    boot_device: &'a str,
}

impl<'a> DeviceResolver<'a> {
    pub fn new(
        reader: &'a dyn SnapshotReader,
        sleeper: &'a dyn Sleep,
        policy: RetryPolicy,
        boot_device: &'a str,
    ) -> Self {
        Self {
            reader,
            sleeper,
            policy,
            boot_device,
        }
    }

    /// Re-reads the devices until exactly one candidate shows up. Several
    /// candidates fail right away; none within the budget fails with
    /// DeviceNotFound.
    pub fn resolve(&self, before: &DeviceSnapshot) -> Result<DeviceDescriptor, DriverError> {
        for attempt in 1..=self.policy.max_attempts {
            let after = capture(self.reader)?;
            let found = candidates(before, &after, self.boot_device);

            match found.as_slice() {
                [device] => {
                    info!(
                        "Resolved attached device '{}' after {attempt} snapshots",
                        device.name
                    );
                    tracing::info!(metric_name = "device_resolution_attempts", value = attempt);
                    return Ok((*device).clone());
                }
                [] => debug!(
                    "No new device yet (attempt {attempt}/{})",
                    self.policy.max_attempts
                ),
                several => {
                    return Err(DriverError::new(ErrorKind::AmbiguousDevice {
                        candidates: several.iter().map(|d| d.name.clone()).collect(),
                    }));
                }
            }

            if attempt < self.policy.max_attempts {
                self.sleeper.sleep(self.policy.interval);
            }
        }

        Err(DriverError::new(ErrorKind::DeviceNotFound {
            attempts: self.policy.max_attempts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::testutils::{disk, RecordingSleep, ScriptedDevices};

    fn mounted(mut device: DeviceDescriptor, mountpoint: &str, tag: &str) -> DeviceDescriptor {
        device.mountpoint = mountpoint.into();
        device.tag = Some(tag.into());
        device
    }

    fn partition(name: &str, mountpoint: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            name: name.into(),
            kind: DeviceKind::Child,
            mountpoint: mountpoint.into(),
            tag: Some(format!("uuid-{name}")),
        }
    }

    fn before() -> DeviceSnapshot {
        DeviceSnapshot::new(vec![
            disk("vda"),
            partition("vda1", "/"),
            mounted(disk("vdb"), "/mnt/vdb", "uuid-vdb"),
        ])
    }

    #[test]
    fn test_from_lsblk() {
        let devices = vec![
            BlockDevice {
                name: "sr0".into(),
                device_type: "rom".into(),
                ..Default::default()
            },
            BlockDevice {
                name: "vda".into(),
                device_type: "disk".into(),
                children: Some(vec![BlockDevice {
                    name: "vda1".into(),
                    device_type: "part".into(),
                    mountpoint: Some("/".into()),
                    uuid: Some("uuid-vda1".into()),
                    children: None,
                }]),
                ..Default::default()
            },
            BlockDevice {
                name: "vdc".into(),
                device_type: "disk".into(),
                uuid: Some("".into()),
                ..Default::default()
            },
        ];

        let snapshot = DeviceSnapshot::from_lsblk(&devices);
        assert_eq!(
            snapshot,
            DeviceSnapshot::new(vec![
                DeviceDescriptor {
                    name: "sr0".into(),
                    kind: DeviceKind::Other,
                    mountpoint: "".into(),
                    tag: None,
                },
                disk("vda"),
                partition("vda1", "/"),
                disk("vdc"),
            ])
        );
        assert!(snapshot.contains("vda1"));
        assert!(!snapshot.contains("vdd"));
        assert_eq!(snapshot.len(), 4);
    }

    #[test]
    fn test_candidates() {
        let before = before();

        let mut after = before.clone();
        after.devices.push(disk("vdc"));
        let found = candidates(&before, &after, "vda");
        assert_eq!(found, vec![&disk("vdc")]);

        // Nothing new
        assert!(candidates(&before, &before, "vda").is_empty());

        // A new partition, a new mounted disk, a new tagged disk and the boot
        // disk all do not qualify
        let before = DeviceSnapshot::default();
        let after = DeviceSnapshot::new(vec![
            disk("vda"),
            partition("vdc1", ""),
            mounted(disk("vdd"), "/srv", "uuid-vdd"),
            DeviceDescriptor {
                tag: Some("uuid-vde".into()),
                ..disk("vde")
            },
            DeviceDescriptor {
                kind: DeviceKind::Other,
                ..disk("loop0")
            },
        ]);
        assert!(candidates(&before, &after, "vda").is_empty());

        // A disk present before is not new, even when unmounted and untagged
        let before = DeviceSnapshot::new(vec![disk("vda"), disk("vdx")]);
        let after = DeviceSnapshot::new(vec![disk("vda"), disk("vdx"), disk("vdy")]);
        assert_eq!(candidates(&before, &after, "vda"), vec![&disk("vdy")]);
    }

    #[test]
    fn test_resolve_single_new_disk() {
        let mut after = before();
        after.devices.push(disk("vdc"));
        let reader = ScriptedDevices::new(vec![after]);
        let sleeper = RecordingSleep::default();

        let device = DeviceResolver::new(&reader, &sleeper, RetryPolicy::device_resolution(), "vda")
            .resolve(&before())
            .unwrap();
        assert_eq!(device.name, "vdc");
        assert_eq!(device.path(), PathBuf::from("/dev/vdc"));
        assert_eq!(reader.reads(), 1);
        assert_eq!(sleeper.count(), 0);
    }

    #[test]
    fn test_resolve_waits_for_device() {
        let mut after = before();
        after.devices.push(disk("vdc"));
        let reader = ScriptedDevices::new(vec![before(), before(), after]);
        let sleeper = RecordingSleep::default();

        let device = DeviceResolver::new(&reader, &sleeper, RetryPolicy::device_resolution(), "vda")
            .resolve(&before())
            .unwrap();
        assert_eq!(device.name, "vdc");
        assert_eq!(reader.reads(), 3);
        assert_eq!(sleeper.total(), Duration::from_secs(6));
    }

    #[test]
    fn test_resolve_ambiguous() {
        let mut after = before();
        after.devices.push(disk("vdc"));
        after.devices.push(disk("vdd"));
        let reader = ScriptedDevices::new(vec![after]);
        let sleeper = RecordingSleep::default();

        let error = DeviceResolver::new(&reader, &sleeper, RetryPolicy::device_resolution(), "vda")
            .resolve(&before())
            .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::AmbiguousDevice {
                candidates: vec!["vdc".into(), "vdd".into()]
            }
        );
        assert_eq!(reader.reads(), 1);
    }

    #[test]
    fn test_resolve_not_found() {
        let reader = ScriptedDevices::new(vec![before()]);
        let sleeper = RecordingSleep::default();

        let error = DeviceResolver::new(&reader, &sleeper, RetryPolicy::device_resolution(), "vda")
            .resolve(&before())
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::DeviceNotFound { attempts: 20 });
        assert_eq!(reader.reads(), 20);
        assert_eq!(sleeper.total(), Duration::from_secs(57));
    }

    #[test]
    fn test_resolve_read_failure() {
        let reader = ScriptedDevices::failing("lsblk: command not found");
        let sleeper = RecordingSleep::default();

        let error = DeviceResolver::new(&reader, &sleeper, RetryPolicy::device_resolution(), "vda")
            .resolve(&before())
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Failed to read block devices: lsblk: command not found"
        );
    }
}
