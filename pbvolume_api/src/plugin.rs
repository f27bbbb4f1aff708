//! Wire types of the Docker volume-plugin protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;

/// Endpoint a plugin call is addressed to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum Method {
    #[serde(rename = "Plugin.Activate")]
    #[strum(serialize = "Plugin.Activate")]
    Activate,
    #[serde(rename = "VolumeDriver.Create")]
    #[strum(serialize = "VolumeDriver.Create")]
    Create,
    #[serde(rename = "VolumeDriver.Remove")]
    #[strum(serialize = "VolumeDriver.Remove")]
    Remove,
    #[serde(rename = "VolumeDriver.Mount")]
    #[strum(serialize = "VolumeDriver.Mount")]
    Mount,
    #[serde(rename = "VolumeDriver.Unmount")]
    #[strum(serialize = "VolumeDriver.Unmount")]
    Unmount,
    #[serde(rename = "VolumeDriver.Path")]
    #[strum(serialize = "VolumeDriver.Path")]
    Path,
    #[serde(rename = "VolumeDriver.Get")]
    #[strum(serialize = "VolumeDriver.Get")]
    Get,
    #[serde(rename = "VolumeDriver.List")]
    #[strum(serialize = "VolumeDriver.List")]
    List,
    #[serde(rename = "VolumeDriver.Capabilities")]
    #[strum(serialize = "VolumeDriver.Capabilities")]
    Capabilities,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub opts: BTreeMap<String, String>,

    /// Caller-side identifier of a Mount/Unmount request.
    #[serde(default, rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Request {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub name: String,

    pub mountpoint: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub status: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Capability {
    pub scope: String,
}

/// Response to any plugin call. An empty `err` means success.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capability>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<String>>,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: message.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.err.is_empty()
    }
}

/// One line of the JSON-lines transport: a method, an optional correlation
/// id, and the request fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Call {
    pub method: Method,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub request: Request,
}

/// Answer to a [`Call`], echoing its id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub response: Response,
}
