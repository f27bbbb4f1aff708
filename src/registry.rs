use std::{collections::BTreeMap, path::PathBuf};

use serde::Serialize;

use pbvolume_api::error::{DriverError, Stage};

/// Local state of one provisioned volume. Identity fields are fixed once the
/// record is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRecord {
    /// Identifier assigned by the remote provider.
    pub volume_id: String,

    /// Where the volume gets mounted on this host.
    pub mount_path: PathBuf,

    /// Local block device the remote volume was attached as.
    pub device_path: PathBuf,
}

/// Map from local volume name to its record.
///
/// The registry does no locking of its own: the driver holds it behind a
/// single mutex for the whole duration of each lifecycle request.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
    volumes: BTreeMap<String, VolumeRecord>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record. Names are registered at most once; replacing an
    /// existing record is refused.
    pub fn put(&mut self, name: impl Into<String>, record: VolumeRecord) -> Result<(), DriverError> {
        let name = name.into();
        if self.volumes.contains_key(&name) {
            return Err(DriverError::internal("Volume is already registered").at_stage(Stage::Register));
        }
        self.volumes.insert(name, record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&VolumeRecord, DriverError> {
        self.volumes
            .get(name)
            .ok_or_else(|| DriverError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.volumes.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<VolumeRecord, DriverError> {
        self.volumes
            .remove(name)
            .ok_or_else(|| DriverError::not_found(name))
    }

    /// Snapshot of all (name, mount path) pairs, ordered by name.
    pub fn list(&self) -> Vec<(String, PathBuf)> {
        self.volumes
            .iter()
            .map(|(name, record)| (name.clone(), record.mount_path.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}
