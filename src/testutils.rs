//! In-memory stand-ins for the remote provider, the host OS and the clock.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, bail, Error};

use pbvolume_api::{
    constants::REMOTE_NAME_PREFIX,
    error::{DriverError, LocalIoError, ReportError},
};

use crate::{
    cloud::{ApiResponse, CloudApi, RequestHandle, RequestStatus, VolumeSpec},
    devices::{DeviceDescriptor, DeviceKind, DeviceSnapshot, SnapshotReader},
    host::HostOps,
    poll::Sleep,
};

/// Records requested sleeps instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleep {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleep {
    pub fn total(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }

    pub fn count(&self) -> usize {
        self.slept.lock().unwrap().len()
    }
}

impl Sleep for RecordingSleep {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// An unmounted, untagged whole disk.
pub fn disk(name: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        name: name.into(),
        kind: DeviceKind::Disk,
        mountpoint: String::new(),
        tag: None,
    }
}

/// Plays back a fixed list of snapshots, repeating the last one.
pub struct ScriptedDevices {
    script: Vec<DeviceSnapshot>,
    failure: Option<String>,
    reads: Mutex<usize>,
}

impl ScriptedDevices {
    pub fn new(script: Vec<DeviceSnapshot>) -> Self {
        Self {
            script,
            failure: None,
            reads: Mutex::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            script: Vec::new(),
            failure: Some(message.into()),
            reads: Mutex::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl SnapshotReader for ScriptedDevices {
    fn snapshot(&self) -> Result<DeviceSnapshot, Error> {
        let mut reads = self.reads.lock().unwrap();
        *reads += 1;
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        Ok(self.script[(*reads - 1).min(self.script.len() - 1)].clone())
    }
}

/// Block devices of a simulated instance: a partitioned boot disk and one
/// data disk already in use. Attaching a remote volume plugs new disks.
pub struct SimulatedDevices {
    devices: Mutex<Vec<DeviceDescriptor>>,
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self {
            devices: Mutex::new(vec![
                disk("vda"),
                DeviceDescriptor {
                    name: "vda1".into(),
                    kind: DeviceKind::Child,
                    mountpoint: "/".into(),
                    tag: Some("uuid-vda1".into()),
                },
                DeviceDescriptor {
                    mountpoint: "/srv".into(),
                    tag: Some("uuid-vdb".into()),
                    ..disk("vdb")
                },
            ]),
        }
    }
}

impl SimulatedDevices {
    fn plug(&self, name: &str) {
        self.devices.lock().unwrap().push(disk(name));
    }

    fn unplug(&self, name: &str) {
        self.devices.lock().unwrap().retain(|device| device.name != name);
    }

    pub fn names(&self) -> Vec<String> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .map(|device| device.name.clone())
            .collect()
    }
}

impl SnapshotReader for SimulatedDevices {
    fn snapshot(&self) -> Result<DeviceSnapshot, Error> {
        Ok(DeviceSnapshot::new(self.devices.lock().unwrap().clone()))
    }
}

/// Remote operations a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Attach,
    Detach,
    Delete,
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// The provider answers with this status code and body.
    Reject(u16, &'static str),
    /// The call never reaches the provider.
    Unreachable(&'static str),
    /// The request is accepted, then reported FAILED with this message.
    RequestFailed(&'static str),
    /// The request is accepted and never leaves pending.
    Stuck,
}

/// Devices that show up locally once an attach completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachEffect {
    OneDisk,
    TwoDisks,
    NoDisk,
}

struct PendingRequest {
    volume_id: String,
    status: RequestStatus,
    pending_polls: u32,
}

struct CloudState {
    calls: Vec<String>,
    faults: HashMap<Op, Fault>,
    attach_effect: AttachEffect,
    pending_polls: u32,
    next_volume: u32,
    next_request: u32,
    next_disk: u8,
    names: HashMap<String, String>,
    requests: HashMap<String, PendingRequest>,
    attached: HashMap<String, Vec<String>>,
    volumes: HashSet<String>,
}

/// A provider that completes every request unless told otherwise. Each call
/// is logged as `<op> <local volume name>`.
pub struct FakeCloud {
    devices: Arc<SimulatedDevices>,
    latency: Duration,
    state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn new(devices: Arc<SimulatedDevices>) -> Self {
        Self {
            devices,
            latency: Duration::ZERO,
            state: Mutex::new(CloudState {
                calls: Vec::new(),
                faults: HashMap::new(),
                attach_effect: AttachEffect::OneDisk,
                pending_polls: 0,
                next_volume: 0,
                next_request: 0,
                next_disk: b'c',
                names: HashMap::new(),
                requests: HashMap::new(),
                attached: HashMap::new(),
                volumes: HashSet::new(),
            }),
        }
    }

    /// Every call takes this long, in real time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every request reports pending this many times before completing.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.state.lock().unwrap().pending_polls = polls;
        self
    }

    pub fn fail(&self, op: Op, fault: Fault) {
        self.state.lock().unwrap().faults.insert(op, fault);
    }

    pub fn heal(&self, op: Op) {
        self.state.lock().unwrap().faults.remove(&op);
    }

    pub fn set_attach_effect(&self, effect: AttachEffect) {
        self.state.lock().unwrap().attach_effect = effect;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Remote volumes that exist and were not deleted.
    pub fn volumes(&self) -> usize {
        self.state.lock().unwrap().volumes.len()
    }

    fn log(&self, op: &str, name: &str) {
        self.state.lock().unwrap().calls.push(format!("{op} {name}"));
        std::thread::sleep(self.latency);
    }

    fn name_of(state: &CloudState, volume_id: &str) -> String {
        state
            .names
            .get(volume_id)
            .cloned()
            .unwrap_or_else(|| volume_id.to_string())
    }

    /// Starts an asynchronous request, or answers the fault injected for `op`.
    /// Returns whether the request will complete.
    fn start(
        state: &mut CloudState,
        op: Op,
        volume_id: &str,
    ) -> Result<(ApiResponse, bool), Error> {
        let status = match state.faults.get(&op).copied() {
            Some(Fault::Reject(status_code, body)) => {
                return Ok((
                    ApiResponse {
                        status_code,
                        body: body.to_string(),
                        ..Default::default()
                    },
                    false,
                ))
            }
            Some(Fault::Unreachable(message)) => bail!("{message}"),
            Some(Fault::RequestFailed(message)) => {
                RequestStatus::from_remote("FAILED", Some(message.to_string()))
            }
            Some(Fault::Stuck) => RequestStatus::Pending("RUNNING".into()),
            None => RequestStatus::Done,
        };
        let completes = status == RequestStatus::Done;

        state.next_request += 1;
        let handle = format!("https://api.test/requests/req-{}/status", state.next_request);
        state.requests.insert(
            handle.clone(),
            PendingRequest {
                volume_id: volume_id.into(),
                status,
                pending_polls: state.pending_polls,
            },
        );

        Ok((
            ApiResponse {
                status_code: 202,
                volume_id: Some(volume_id.into()),
                request: Some(RequestHandle::new(handle)),
                body: format!(r#"{{"id":"{volume_id}"}}"#),
            },
            completes,
        ))
    }
}

impl CloudApi for FakeCloud {
    fn create_volume(&self, spec: &VolumeSpec) -> Result<ApiResponse, Error> {
        let name = spec
            .name
            .strip_prefix(REMOTE_NAME_PREFIX)
            .unwrap_or(&spec.name);
        self.log("create", name);

        let mut state = self.state.lock().unwrap();
        state.next_volume += 1;
        let volume_id = format!("vol-{}", state.next_volume);
        state.names.insert(volume_id.clone(), name.into());

        let (response, completes) = Self::start(&mut state, Op::Create, &volume_id)?;
        if completes {
            state.volumes.insert(volume_id);
        }
        Ok(response)
    }

    fn attach_volume(&self, volume_id: &str, _server_id: &str) -> Result<ApiResponse, Error> {
        let name = Self::name_of(&self.state.lock().unwrap(), volume_id);
        self.log("attach", &name);

        let mut state = self.state.lock().unwrap();
        let (response, completes) = Self::start(&mut state, Op::Attach, volume_id)?;
        if completes {
            let count = match state.attach_effect {
                AttachEffect::OneDisk => 1,
                AttachEffect::TwoDisks => 2,
                AttachEffect::NoDisk => 0,
            };
            let mut plugged = Vec::new();
            for _ in 0..count {
                let device = format!("vd{}", state.next_disk as char);
                state.next_disk += 1;
                self.devices.plug(&device);
                plugged.push(device);
            }
            state.attached.insert(volume_id.into(), plugged);
        }
        Ok(response)
    }

    fn detach_volume(&self, volume_id: &str, _server_id: &str) -> Result<ApiResponse, Error> {
        let name = Self::name_of(&self.state.lock().unwrap(), volume_id);
        self.log("detach", &name);

        let mut state = self.state.lock().unwrap();
        let (response, completes) = Self::start(&mut state, Op::Detach, volume_id)?;
        if completes {
            for device in state.attached.remove(volume_id).unwrap_or_default() {
                self.devices.unplug(&device);
            }
        }
        Ok(response)
    }

    fn delete_volume(&self, volume_id: &str) -> Result<ApiResponse, Error> {
        let name = Self::name_of(&self.state.lock().unwrap(), volume_id);
        self.log("delete", &name);

        let mut state = self.state.lock().unwrap();
        let (response, completes) = Self::start(&mut state, Op::Delete, volume_id)?;
        if completes {
            state.volumes.remove(volume_id);
        }
        Ok(response)
    }

    fn request_status(&self, handle: &RequestHandle) -> Result<RequestStatus, Error> {
        let name = {
            let state = self.state.lock().unwrap();
            let request = state
                .requests
                .get(handle.as_str())
                .ok_or_else(|| anyhow!("Unknown request '{handle}'"))?;
            Self::name_of(&state, &request.volume_id)
        };
        self.log("status", &name);

        let mut state = self.state.lock().unwrap();
        let request = state
            .requests
            .get_mut(handle.as_str())
            .ok_or_else(|| anyhow!("Unknown request '{handle}'"))?;
        if request.pending_polls > 0 {
            request.pending_polls -= 1;
            return Ok(RequestStatus::Pending("QUEUED".into()));
        }
        Ok(request.status.clone())
    }
}

#[derive(Default)]
struct HostState {
    calls: Vec<String>,
    failing: HashSet<&'static str>,
    directories: HashSet<PathBuf>,
    mounted: BTreeMap<PathBuf, PathBuf>,
    metadata: BTreeMap<PathBuf, Vec<u8>>,
}

/// Host OS double. Calls are logged as `<verb> <args>`; the verbs are
/// `format`, `mkdir`, `mount`, `unmount`, `write-metadata` and
/// `remove-metadata`. Mount and unmount behave like the real commands on an
/// already mounted or not mounted path.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn fail(&self, verb: &'static str) {
        self.state.lock().unwrap().failing.insert(verb);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn is_mounted(&self, path: &Path) -> bool {
        self.state.lock().unwrap().mounted.contains_key(path)
    }

    pub fn metadata(&self, path: &Path) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .metadata
            .get(path)
            .map(|contents| String::from_utf8_lossy(contents).into_owned())
    }

    /// Logs the call and fails it when `verb` was marked as failing.
    fn enter(&self, verb: &'static str, args: String) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{verb} {args}"));
        if state.failing.contains(verb) {
            bail!("{verb}: simulated failure");
        }
        Ok(())
    }
}

impl HostOps for FakeHost {
    fn format(&self, device: &Path, filesystem: &str, volume_id: &str) -> Result<(), DriverError> {
        self.enter(
            "format",
            format!("{} {filesystem} {volume_id}", device.display()),
        )
        .structured(LocalIoError::Format {
            device: device.display().to_string(),
        })
    }

    fn prepare_mount_point(&self, path: &Path) -> Result<(), DriverError> {
        self.enter("mkdir", path.display().to_string())
            .map(|()| {
                self.state.lock().unwrap().directories.insert(path.into());
            })
            .structured(LocalIoError::CreateMountDirectory {
                path: path.display().to_string(),
            })
    }

    fn mount(&self, device: &Path, path: &Path, filesystem: &str) -> Result<(), DriverError> {
        self.enter(
            "mount",
            format!("{} {} {filesystem}", device.display(), path.display()),
        )
        .and_then(|()| {
            let mut state = self.state.lock().unwrap();
            if !state.directories.contains(path) {
                bail!("mount: {}: mount point does not exist.", path.display());
            }
            if state.mounted.contains_key(path) {
                bail!(
                    "mount: {}: {} already mounted on {}.",
                    path.display(),
                    device.display(),
                    path.display()
                );
            }
            state.mounted.insert(path.into(), device.into());
            Ok(())
        })
        .structured(LocalIoError::Mount {
            device: device.display().to_string(),
            path: path.display().to_string(),
        })
    }

    fn unmount(&self, path: &Path) -> Result<(), DriverError> {
        self.enter("unmount", path.display().to_string())
            .and_then(|()| match self.state.lock().unwrap().mounted.remove(path) {
                Some(_) => Ok(()),
                None => bail!("umount: {}: not mounted.", path.display()),
            })
            .structured(LocalIoError::Unmount {
                path: path.display().to_string(),
            })
    }

    fn write_metadata(&self, path: &Path, contents: &[u8]) -> Result<(), DriverError> {
        self.enter("write-metadata", path.display().to_string())
            .map(|()| {
                self.state
                    .lock()
                    .unwrap()
                    .metadata
                    .insert(path.into(), contents.to_vec());
            })
            .structured(LocalIoError::WriteMetadata {
                path: path.display().to_string(),
            })
    }

    fn remove_metadata(&self, path: &Path) -> Result<(), Error> {
        self.enter("remove-metadata", path.display().to_string())?;
        self.state.lock().unwrap().metadata.remove(path);
        Ok(())
    }
}
