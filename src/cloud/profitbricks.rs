use std::time::Duration;

use anyhow::{anyhow, Context, Error};
use log::{debug, trace};
use reqwest::{
    blocking::{Client as HttpClient, RequestBuilder},
    header, Method,
};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ApiResponse, CloudApi, RequestHandle, RequestStatus, VolumeSpec};

/// Timeout of a single HTTP exchange with the API.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Blocking client for the ProfitBricks cloud API.
pub struct Client {
    http: HttpClient,
    base: Url,
    datacenter_id: String,
    username: String,
    password: String,
}

#[derive(Serialize)]
struct CreateVolumeBody<'a> {
    properties: &'a VolumeSpec,
}

#[derive(Serialize)]
struct AttachVolumeBody<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct ResourceBody {
    id: Option<String>,
}

#[derive(Deserialize)]
struct RequestStatusBody {
    metadata: RequestStatusMetadata,
}

#[derive(Deserialize)]
struct RequestStatusMetadata {
    status: String,
    message: Option<String>,
}

impl Client {
    pub fn new(
        base: Url,
        datacenter_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, Error> {
        let http = HttpClient::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base,
            datacenter_id: datacenter_id.into(),
            username: username.into(),
            password: password.into(),
        })
    }

    /// Builds `<base>/<segments...>`, regardless of a trailing slash on the base.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("API URL '{}' cannot be a base", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    fn send(&self, request: RequestBuilder) -> Result<ApiResponse, Error> {
        let response = request.send().context("Failed to send request to remote API")?;

        let status_code = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(RequestHandle::new);
        let body = response
            .text()
            .context("Failed to read response body from remote API")?;
        trace!("Remote API answered {status_code}: {body}");

        let volume_id = serde_json::from_str::<ResourceBody>(&body)
            .ok()
            .and_then(|resource| resource.id);

        Ok(ApiResponse {
            status_code,
            volume_id,
            request: location,
            body,
        })
    }

    fn send_json<T: Serialize>(&self, url: Url, body: &T) -> Result<ApiResponse, Error> {
        let body = serde_json::to_string(body).context("Failed to serialize request body")?;
        self.send(
            self.request(Method::POST, url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body),
        )
    }
}

impl CloudApi for Client {
    fn create_volume(&self, spec: &VolumeSpec) -> Result<ApiResponse, Error> {
        let url = self.endpoint(&["datacenters", &self.datacenter_id, "volumes"])?;
        debug!("Creating remote volume '{}'", spec.name);
        self.send_json(url, &CreateVolumeBody { properties: spec })
    }

    fn attach_volume(&self, volume_id: &str, server_id: &str) -> Result<ApiResponse, Error> {
        let url = self.endpoint(&[
            "datacenters",
            &self.datacenter_id,
            "servers",
            server_id,
            "volumes",
        ])?;
        debug!("Attaching remote volume '{volume_id}' to server '{server_id}'");
        self.send_json(url, &AttachVolumeBody { id: volume_id })
    }

    fn detach_volume(&self, volume_id: &str, server_id: &str) -> Result<ApiResponse, Error> {
        let url = self.endpoint(&[
            "datacenters",
            &self.datacenter_id,
            "servers",
            server_id,
            "volumes",
            volume_id,
        ])?;
        debug!("Detaching remote volume '{volume_id}' from server '{server_id}'");
        self.send(self.request(Method::DELETE, url))
    }

    fn delete_volume(&self, volume_id: &str) -> Result<ApiResponse, Error> {
        let url = self.endpoint(&["datacenters", &self.datacenter_id, "volumes", volume_id])?;
        debug!("Deleting remote volume '{volume_id}'");
        self.send(self.request(Method::DELETE, url))
    }

    fn request_status(&self, handle: &RequestHandle) -> Result<RequestStatus, Error> {
        let url = Url::parse(handle.as_str())
            .with_context(|| format!("Invalid request status location '{handle}'"))?;
        let response = self.send(self.request(Method::GET, url))?;
        if !response.is_success() {
            return Err(anyhow!(
                "Request status query returned {}: {}",
                response.status_code,
                response.body
            ));
        }

        let status: RequestStatusBody = serde_json::from_str(&response.body)
            .context("Failed to parse request status document")?;
        Ok(RequestStatus::from_remote(
            &status.metadata.status,
            status.metadata.message,
        ))
    }
}
