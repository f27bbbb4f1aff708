use log::{info, warn};

use pbvolume_api::error::{DriverError, DriverResultExt, Stage};

use crate::{
    cloud::{self, RequestHandle},
    driver::{Collaborators, DriverParams},
    host,
    poll::PollWaiter,
    registry::{VolumeRecord, VolumeRegistry},
};

/// Detaches and deletes the remote volume behind a registered name, then
/// forgets it. The record stays registered until both remote steps are done,
/// so a failed removal can be retried.
pub struct Remover<'a> {
    params: &'a DriverParams,
    collaborators: &'a Collaborators,
}

impl<'a> Remover<'a> {
    pub fn new(params: &'a DriverParams, collaborators: &'a Collaborators) -> Self {
        Self {
            params,
            collaborators,
        }
    }

    pub fn run(
        &self,
        registry: &mut VolumeRegistry,
        name: &str,
    ) -> Result<VolumeRecord, DriverError> {
        let volume_id = registry.get(name)?.volume_id.clone();
        info!("Removing volume '{name}' (remote volume '{volume_id}')");

        self.detach(&volume_id).stage(Stage::Detach)?;
        self.delete(&volume_id).stage(Stage::Delete)?;
        let record = self.deregister(registry, name).stage(Stage::Deregister)?;

        info!("Removed volume '{name}'");
        tracing::info!(metric_name = "volume_removed", value = true);
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

    fn detach(&self, volume_id: &str) -> Result<(), DriverError> {
        let accepted = cloud::accept(
            self.collaborators
                .api
                .detach_volume(volume_id, &self.params.server_id),
        )?;
        self.wait(&accepted.request)
    }

    fn delete(&self, volume_id: &str) -> Result<(), DriverError> {
        let accepted = cloud::accept(self.collaborators.api.delete_volume(volume_id))?;
        self.wait(&accepted.request)
    }

    fn deregister(
        &self,
        registry: &mut VolumeRegistry,
        name: &str,
    ) -> Result<VolumeRecord, DriverError> {
        let record = registry.remove(name)?;

        let metadata = host::metadata_file(&self.params.metadata_root, name);
        if let Err(e) = self.collaborators.host.remove_metadata(&metadata) {
            warn!(
                "Failed to remove metadata file '{}' of volume '{name}': {e:#}",
                metadata.display()
            );
        }

        Ok(record)
    }
}
