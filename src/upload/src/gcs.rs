// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The resumable upload protocol for the Cloud Storage JSON API.
//!
//! See <https://cloud.google.com/storage/docs/performing-resumable-uploads>.

use crate::error::{BuildError, TransportError};
use crate::model::{ObjectMetadata, UploadTarget, UploadedObject};
use crate::options::RESUMABLE_UPLOAD_QUANTUM;
use crate::transport::{Chunk, ResumableTransport, TransmitStatus, UploadHandle};
use google_cloud_auth::credentials::{CacheableResource, Credentials};
use http::Extensions;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const RESUME_INCOMPLETE: reqwest::StatusCode = reqwest::StatusCode::PERMANENT_REDIRECT;

// Cloud Storage returns 499 after a successful cancellation.
const CLIENT_CLOSED_REQUEST: u16 = 499;

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Sends resumable uploads to Cloud Storage.
///
/// # Example
/// ```no_run
/// # use pipeline_upload::gcs::GcsTransport;
/// # async fn sample() -> anyhow::Result<()> {
/// let transport = GcsTransport::builder()
///     .with_endpoint("https://storage.googleapis.com")
///     .build()
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct GcsTransport {
    client: reqwest::Client,
    credentials: Credentials,
    endpoint: String,
}

impl GcsTransport {
    pub fn builder() -> GcsTransportBuilder {
        GcsTransportBuilder::new()
    }

    /// Creates a transport sharing an existing HTTP client and credentials.
    pub fn new<E: Into<String>>(
        client: reqwest::Client,
        credentials: Credentials,
        endpoint: E,
    ) -> Self {
        Self {
            client,
            credentials,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn apply_auth_headers(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let cached = self
            .credentials
            .headers(Extensions::new())
            .await
            .map_err(TransportError::authentication)?;
        match cached {
            CacheableResource::New { data, .. } => Ok(builder.headers(data)),
            CacheableResource::NotModified => Err(TransportError::authentication(
                "the credentials returned cached headers for an uncached request",
            )),
        }
    }

    fn initiate_request(
        &self,
        target: &UploadTarget,
        metadata: &ObjectMetadata,
    ) -> reqwest::RequestBuilder {
        let bucket = utf8_percent_encode(target.bucket(), PATH_SEGMENT);
        let builder = self
            .client
            .post(format!("{}/upload/storage/v1/b/{bucket}/o", self.endpoint))
            .query(&[("uploadType", "resumable"), ("name", target.object())])
            .header("content-type", "application/json");
        let builder = metadata
            .content_type
            .iter()
            .fold(builder, |b, v| b.header("x-upload-content-type", v));
        builder.json(&insert_body(target, metadata))
    }

    async fn send_status_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<TransmitStatus, TransportError> {
        let builder = self.apply_auth_headers(builder).await?;
        let response = builder.send().await.map_err(TransportError::io)?;
        self::handle_status_response(response).await
    }
}

#[async_trait::async_trait]
impl ResumableTransport for GcsTransport {
    fn alignment(&self) -> usize {
        RESUMABLE_UPLOAD_QUANTUM
    }

    async fn initiate(
        &self,
        target: &UploadTarget,
        metadata: &ObjectMetadata,
    ) -> Result<UploadHandle, TransportError> {
        let builder = self.initiate_request(target, metadata);
        let builder = self.apply_auth_headers(builder).await?;
        let response = builder.send().await.map_err(TransportError::io)?;
        if !response.status().is_success() {
            return Err(to_http_error(response).await);
        }
        let location = response
            .headers()
            .get(http::header::LOCATION)
            .ok_or_else(|| {
                TransportError::deser("missing Location header in start resumable upload")
            })?;
        location
            .to_str()
            .map_err(TransportError::deser)
            .map(UploadHandle::new)
    }

    async fn transmit(
        &self,
        handle: &UploadHandle,
        chunk: &Chunk,
    ) -> Result<TransmitStatus, TransportError> {
        let builder = self
            .client
            .put(handle.as_str())
            .header("content-type", "application/octet-stream")
            .header("content-range", content_range(chunk))
            .body(chunk.data().clone());
        self.send_status_request(builder).await
    }

    async fn recover(&self, handle: &UploadHandle) -> Result<TransmitStatus, TransportError> {
        let builder = self
            .client
            .put(handle.as_str())
            .header("content-type", "application/octet-stream")
            .header("content-range", "bytes */*");
        self.send_status_request(builder).await
    }

    async fn abort(&self, handle: &UploadHandle) -> Result<(), TransportError> {
        let builder = self.client.delete(handle.as_str());
        let builder = self.apply_auth_headers(builder).await?;
        let response = builder.send().await.map_err(TransportError::io)?;
        let status = response.status();
        if status.is_success() || status.as_u16() == CLIENT_CLOSED_REQUEST {
            return Ok(());
        }
        Err(to_http_error(response).await)
    }
}

/// Configures a [GcsTransport].
#[derive(Clone, Debug, Default)]
pub struct GcsTransportBuilder {
    endpoint: Option<String>,
    credentials: Option<Credentials>,
    client: Option<reqwest::Client>,
}

impl GcsTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint, defaults to [DEFAULT_ENDPOINT].
    pub fn with_endpoint<V: Into<String>>(mut self, v: V) -> Self {
        self.endpoint = Some(v.into());
        self
    }

    /// Sets the credentials, defaults to the Application Default Credentials.
    pub fn with_credentials<V: Into<Credentials>>(mut self, v: V) -> Self {
        self.credentials = Some(v.into());
        self
    }

    pub fn with_client(mut self, v: reqwest::Client) -> Self {
        self.client = Some(v);
        self
    }

    pub async fn build(self) -> Result<GcsTransport, BuildError> {
        let credentials = match self.credentials {
            Some(c) => c,
            None => google_cloud_auth::credentials::Builder::default()
                .build()
                .map_err(BuildError::Credentials)?,
        };
        let client = match self.client {
            Some(c) => c,
            None => reqwest::Client::builder()
                .build()
                .map_err(BuildError::Client)?,
        };
        let endpoint = self
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Ok(GcsTransport::new(client, credentials, endpoint))
    }
}

fn insert_body(target: &UploadTarget, metadata: &ObjectMetadata) -> serde_json::Value {
    let mut body = serde_json::json!({ "name": target.object() });
    if let Some(content_type) = &metadata.content_type {
        body["contentType"] = serde_json::Value::from(content_type.as_str());
    }
    if !metadata.metadata.is_empty() {
        body["metadata"] = serde_json::json!(metadata.metadata);
    }
    body
}

/// Formats the `Content-Range` header for `chunk`.
///
/// Non-final chunks leave the total size unknown, final chunks declare it.
/// An empty final chunk only declares the total size.
fn content_range(chunk: &Chunk) -> String {
    match (chunk.is_empty(), chunk.is_final()) {
        (true, true) => format!("bytes */{}", chunk.offset()),
        (true, false) => "bytes */*".to_string(),
        (false, true) => format!(
            "bytes {}-{}/{}",
            chunk.offset(),
            chunk.end() - 1,
            chunk.end()
        ),
        (false, false) => format!("bytes {}-{}/*", chunk.offset(), chunk.end() - 1),
    }
}

async fn handle_status_response(
    response: reqwest::Response,
) -> Result<TransmitStatus, TransportError> {
    if response.status() == RESUME_INCOMPLETE {
        return match parse_range_end(response.headers()) {
            Some(persisted) => Ok(TransmitStatus::Partial(persisted)),
            None => Err(to_http_error(response).await),
        };
    }
    if !response.status().is_success() {
        return Err(to_http_error(response).await);
    }
    let object = response
        .json::<UploadedObject>()
        .await
        .map_err(TransportError::deser)?;
    Ok(TransmitStatus::Finalized(Box::new(object)))
}

/// Returns the persisted size from a `Range: bytes=0-{end}` header.
///
/// The range is inclusive, `bytes=0-999` means 1000 bytes are persisted.
fn parse_range_end(headers: &http::HeaderMap) -> Option<u64> {
    let Some(range) = headers.get(http::header::RANGE) else {
        // A missing `Range:` header indicates that no bytes are persisted.
        return Some(0_u64);
    };
    // Uploads are sequential, the persisted range always starts at zero.
    let end = std::str::from_utf8(range.as_bytes().strip_prefix(b"bytes=0-")?).ok()?;
    end.parse::<u64>().ok().map(|e| e + 1)
}

async fn to_http_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    match response.bytes().await {
        Ok(payload) => TransportError::http(status, headers, payload),
        Err(e) => TransportError::io(e),
    }
}
