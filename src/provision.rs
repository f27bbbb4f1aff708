use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use pbvolume_api::error::{DriverError, DriverResultExt, ErrorKind, ReportError, Stage};

use crate::{
    cloud::{self, RequestHandle, VolumeSpec},
    devices::{self, DeviceDescriptor, DeviceResolver, DeviceSnapshot},
    driver::{Collaborators, DriverParams},
    host,
    poll::PollWaiter,
    registry::{VolumeRecord, VolumeRegistry},
};

/// Progress of one provisioning run. Any step can fail, which aborts the run
/// in the state reached so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ProvisionState {
    Requested,
    Created,
    Attached,
    DeviceResolved,
    Formatted,
    MountPointPrepared,
    Registered,
}

/// Informational document written next to each registered volume.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VolumeMetadata<'a> {
    name: &'a str,
    volume_id: &'a str,
    device_path: &'a Path,
    mount_path: &'a Path,
    created_at: DateTime<Utc>,
}

/// Creates a remote volume, attaches it to this instance, formats the
/// resulting device and registers it. Nothing is undone when a step fails.
pub struct Provisioner<'a> {
    params: &'a DriverParams,
    collaborators: &'a Collaborators,
    name: &'a str,
    state: ProvisionState,
}

impl<'a> Provisioner<'a> {
    pub fn new(params: &'a DriverParams, collaborators: &'a Collaborators, name: &'a str) -> Self {
        Self {
            params,
            collaborators,
            name,
            state: ProvisionState::Requested,
        }
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    fn advance(&mut self, next: ProvisionState) {
        debug!("Volume '{}': {} -> {next}", self.name, self.state);
        self.state = next;
    }

    /// Runs every step to completion. The returned error carries the stage
    /// that failed.
    pub fn run(&mut self, registry: &mut VolumeRegistry) -> Result<VolumeRecord, DriverError> {
        info!("Provisioning volume '{}'", self.name);

        let volume_id = self.create().stage(Stage::Create)?;
        self.advance(ProvisionState::Created);

        let before = self.attach(&volume_id).stage(Stage::Attach)?;
        self.advance(ProvisionState::Attached);

        let device = self.resolve_device(&before).stage(Stage::ResolveDevice)?;
        self.advance(ProvisionState::DeviceResolved);

        let record = VolumeRecord {
            volume_id,
            mount_path: self.params.mount_root.join(&device.name),
            device_path: device.path(),
        };

        self.collaborators
            .host
            .format(&record.device_path, &self.params.filesystem, &record.volume_id)
            .stage(Stage::Format)?;
        self.advance(ProvisionState::Formatted);

        self.collaborators
            .host
            .prepare_mount_point(&record.mount_path)
            .stage(Stage::PrepareMountPoint)?;
        self.advance(ProvisionState::MountPointPrepared);

        self.register(registry, &record).stage(Stage::Register)?;
        self.advance(ProvisionState::Registered);

        info!(
            "Provisioned volume '{}' as remote volume '{}' on '{}'",
            self.name,
            record.volume_id,
            record.device_path.display()
        );
        tracing::info!(metric_name = "volume_provisioned", value = true);
        Ok(record)
    }

    fn wait(&self, request: &RequestHandle) -> Result<(), DriverError> {
        PollWaiter::new(
            self.collaborators.api.as_ref(),
            self.collaborators.sleeper.as_ref(),
            self.params.poll,
        )
        .wait(request)
    }

    fn create(&self) -> Result<String, DriverError> {
        let spec = VolumeSpec::for_volume(self.name, self.params.size, &self.params.disk_type);
        let accepted = cloud::accept(self.collaborators.api.create_volume(&spec))?;
        let volume_id = accepted.volume_id.structured(ErrorKind::Provision {
            message: "Remote API accepted the volume without an id".into(),
        })?;

        debug!("Remote volume '{volume_id}' requested for '{}'", self.name);
        self.wait(&accepted.request)?;
        Ok(volume_id)
    }

    /// Attaches the volume and returns the device snapshot taken right
    /// before the attach.
    fn attach(&self, volume_id: &str) -> Result<DeviceSnapshot, DriverError> {
        let before = devices::capture(self.collaborators.devices.as_ref())?;
        let accepted = cloud::accept(
            self.collaborators
                .api
                .attach_volume(volume_id, &self.params.server_id),
        )?;
        self.wait(&accepted.request)?;
        Ok(before)
    }

    fn resolve_device(&self, before: &DeviceSnapshot) -> Result<DeviceDescriptor, DriverError> {
        DeviceResolver::new(
            self.collaborators.devices.as_ref(),
            self.collaborators.sleeper.as_ref(),
            self.params.device_retry,
            &self.params.boot_device,
        )
        .resolve(before)
    }

    /// Records the volume. Only after this step is the volume visible to
    /// other requests.
    fn register(
        &self,
        registry: &mut VolumeRegistry,
        record: &VolumeRecord,
    ) -> Result<(), DriverError> {
        if registry.contains(self.name) {
            return Err(DriverError::internal("Volume is already registered"));
        }

        let metadata = VolumeMetadata {
            name: self.name,
            volume_id: &record.volume_id,
            device_path: &record.device_path,
            mount_path: &record.mount_path,
            created_at: Utc::now(),
        };
        let contents = serde_json::to_vec_pretty(&metadata)
            .structured(ErrorKind::Internal("Failed to serialize volume metadata"))?;
        self.collaborators.host.write_metadata(
            &host::metadata_file(&self.params.metadata_root, self.name),
            &contents,
        )?;

        registry.put(self.name, record.clone())
    }
}
