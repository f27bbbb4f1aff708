use std::fmt::{self, Display};

use anyhow::Error;
use serde::Serialize;

use pbvolume_api::{
    constants::{REMOTE_NAME_PREFIX, VOLUME_LICENCE_TYPE},
    error::{DriverError, ErrorKind, ReportError},
};

pub mod profitbricks;

/// Opaque reference to an asynchronous remote request, queried for its
/// terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestHandle(String);

impl RequestHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of an asynchronous remote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Still queued or running; carries the provider's status string.
    Pending(String),
    Done,
    Failed { message: String },
}

impl RequestStatus {
    /// Maps a provider status string onto the three recognized states. A
    /// failure without a provider message still reports the failed status.
    pub fn from_remote(status: &str, message: Option<String>) -> Self {
        match status {
            "DONE" => RequestStatus::Done,
            "FAILED" => RequestStatus::Failed {
                message: message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Request failed with status {status}")),
            },
            other => RequestStatus::Pending(other.to_string()),
        }
    }
}

/// Properties of a remote volume to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Display name, derived from the local volume name.
    pub name: String,

    /// Size in GB.
    pub size: u32,

    #[serde(rename = "type")]
    pub disk_type: String,

    pub licence_type: String,
}

impl VolumeSpec {
    pub fn for_volume(local_name: &str, size: u32, disk_type: &str) -> Self {
        Self {
            name: remote_name(local_name),
            size,
            disk_type: disk_type.into(),
            licence_type: VOLUME_LICENCE_TYPE.into(),
        }
    }
}

/// Remote display name of the volume backing `local_name`.
pub fn remote_name(local_name: &str) -> String {
    format!("{REMOTE_NAME_PREFIX}{local_name}")
}

/// What the remote API answered to a mutating call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiResponse {
    pub status_code: u16,

    /// Identifier of the affected volume, when the provider returns one.
    pub volume_id: Option<String>,

    /// Handle of the asynchronous request started by the call.
    pub request: Option<RequestHandle>,

    /// Raw response body.
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status_code)
    }

    /// Returns the handle to wait on, or a provision error carrying the
    /// provider's response body unmodified.
    pub fn accepted(self) -> Result<Accepted, DriverError> {
        if !self.is_success() {
            return Err(DriverError::provision(if self.body.is_empty() {
                format!("Remote API returned status {}", self.status_code)
            } else {
                self.body
            }));
        }

        match self.request {
            Some(request) => Ok(Accepted {
                volume_id: self.volume_id,
                request,
            }),
            None => Err(DriverError::provision(format!(
                "Remote API accepted the call with status {} but returned no request to wait on",
                self.status_code
            ))),
        }
    }
}

/// Turns the outcome of a mutating call into the request to wait on. A call
/// that never reached the provider is a provision error as well.
pub fn accept(response: Result<ApiResponse, Error>) -> Result<Accepted, DriverError> {
    response
        .structured(ErrorKind::Provision {
            message: "Failed to reach remote API".into(),
        })?
        .accepted()
}

/// A call the provider accepted and is now carrying out asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub volume_id: Option<String>,
    pub request: RequestHandle,
}

/// Remote block-storage provider. Errors are transport failures; rejections
/// come back as a non-success [`ApiResponse`].
pub trait CloudApi: Send + Sync {
    fn create_volume(&self, spec: &VolumeSpec) -> Result<ApiResponse, Error>;

    fn attach_volume(&self, volume_id: &str, server_id: &str) -> Result<ApiResponse, Error>;

    fn detach_volume(&self, volume_id: &str, server_id: &str) -> Result<ApiResponse, Error>;

    fn delete_volume(&self, volume_id: &str) -> Result<ApiResponse, Error>;

    fn request_status(&self, handle: &RequestHandle) -> Result<RequestStatus, Error>;
}
