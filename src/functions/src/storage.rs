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

//! Reads and writes Cloud Storage objects.

use crate::context::Context;
use crate::{Error, Result};
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use pipeline_upload::gcs::GcsTransport;
use pipeline_upload::{UploadOptions, UploadSession, UploadTarget, UploadedObject};
use std::sync::Arc;

/// Characters escaped in URL path segments.
pub(crate) const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The object store operations used by the handlers.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// Uploads `data` in a single request, returns the `gs://` URI.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String>;

    /// Starts a resumable upload, returns the session receiving the data.
    async fn open_stream(
        &self,
        bucket: &str,
        key: &str,
        chunk_size: usize,
        content_type: Option<String>,
    ) -> Result<UploadSession>;
}

/// A Cloud Storage client over the JSON API.
#[derive(Clone, Debug)]
pub struct StorageClient {
    context: Context,
    transport: Arc<GcsTransport>,
}

impl StorageClient {
    pub fn new(context: Context) -> Self {
        let transport = GcsTransport::new(
            context.http().clone(),
            context.credentials().clone(),
            context.config().endpoints.storage.as_str(),
        );
        Self {
            context,
            transport: Arc::new(transport),
        }
    }

    fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Downloads the contents of an object.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint(),
            utf8_percent_encode(bucket, PATH_SEGMENT),
            utf8_percent_encode(key, PATH_SEGMENT),
        );
        let builder = self.context.http().get(url).query(&[("alt", "media")]);
        let response = self.context.send(builder).await?;
        response.bytes().await.map_err(Error::io)
    }

    /// Downloads an object and parses it as JSON.
    pub async fn download_json(&self, bucket: &str, key: &str) -> Result<serde_json::Value> {
        let data = self.download(bucket, key).await?;
        serde_json::from_slice(&data).map_err(Error::deser)
    }
}

#[async_trait::async_trait]
impl ObjectStore for StorageClient {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint(),
            utf8_percent_encode(bucket, PATH_SEGMENT),
        );
        let builder = self
            .context
            .http()
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .header("content-type", content_type)
            .body(data);
        let object = self.context.send_json::<UploadedObject>(builder).await?;
        tracing::debug!("uploaded {} bytes to {}", object.size, object.uri());
        Ok(object.uri())
    }

    async fn open_stream(
        &self,
        bucket: &str,
        key: &str,
        chunk_size: usize,
        content_type: Option<String>,
    ) -> Result<UploadSession> {
        let target = UploadTarget::new(bucket, key);
        let uri = target.to_string();
        let options = content_type
            .into_iter()
            .fold(UploadOptions::new().with_chunk_size(chunk_size), |o, v| {
                o.with_content_type(v)
            });
        UploadSession::open(self.transport.clone(), target, options)
            .await
            .map_err(|source| Error::Upload { uri, source })
    }
}

/// Splits a `gs://bucket/object` URI into its bucket and object names.
///
/// # Example
/// ```
/// # use pipeline_functions::storage::parse_gs_uri;
/// let (bucket, object) = parse_gs_uri("gs://my-bucket/raw/data.csv")?;
/// assert_eq!(bucket, "my-bucket");
/// assert_eq!(object, "raw/data.csv");
/// # Ok::<(), pipeline_functions::Error>(())
/// ```
pub fn parse_gs_uri(uri: &str) -> Result<(&str, &str)> {
    let invalid = || Error::InvalidUri(uri.to_string());
    let path = uri.strip_prefix("gs://").ok_or_else(invalid)?;
    let (bucket, object) = path.split_once('/').ok_or_else(invalid)?;
    if bucket.is_empty() || object.is_empty() {
        return Err(invalid());
    }
    Ok((bucket, object))
}
