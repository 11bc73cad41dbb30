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

//! The resumable upload protocol, as seen by an [UploadSession].
//!
//! [UploadSession]: crate::session::UploadSession

use crate::error::TransportError;
use crate::model::{ObjectMetadata, UploadTarget, UploadedObject};
use bytes::Bytes;
use std::sync::Arc;

/// Identifies an upload session created by the service.
///
/// For Cloud Storage this is the session URL returned in the `Location`
/// header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadHandle(String);

impl UploadHandle {
    pub fn new<T: Into<String>>(v: T) -> Self {
        Self(v.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A contiguous range of the upload, sent in a single request.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    offset: u64,
    data: Bytes,
    finalize: bool,
}

impl Chunk {
    pub fn new(offset: u64, data: Bytes, finalize: bool) -> Self {
        Self {
            offset,
            data,
            finalize,
        }
    }

    /// The position of the first byte in the object.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One past the last byte in the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.len()
    }

    /// If true, the request declares the total object size and finalizes the
    /// upload.
    pub fn is_final(&self) -> bool {
        self.finalize
    }

    /// The part of this chunk after `persisted`.
    ///
    /// `persisted` must be in the `[offset, end]` range.
    pub(crate) fn resume_from(&self, persisted: u64) -> Self {
        let skip = (persisted - self.offset) as usize;
        Self {
            offset: persisted,
            data: self.data.slice(skip..),
            finalize: self.finalize,
        }
    }
}

/// The service response to a chunk or a status query.
#[derive(Clone, Debug, PartialEq)]
pub enum TransmitStatus {
    /// The upload is still open, with this many bytes persisted.
    Partial(u64),
    /// The upload is finalized.
    Finalized(Box<UploadedObject>),
}

/// The requests needed by an upload session.
///
/// [GcsTransport][crate::gcs::GcsTransport] implements this trait for the
/// Cloud Storage JSON API. Applications may provide other implementations,
/// for example, to upload to a different service or to test their code.
#[async_trait::async_trait]
pub trait ResumableTransport: std::fmt::Debug + Send + Sync {
    /// Non-final chunks must be a multiple of this size.
    fn alignment(&self) -> usize;

    /// Creates a new upload session.
    async fn initiate(
        &self,
        target: &UploadTarget,
        metadata: &ObjectMetadata,
    ) -> Result<UploadHandle, TransportError>;

    /// Sends one chunk.
    async fn transmit(
        &self,
        handle: &UploadHandle,
        chunk: &Chunk,
    ) -> Result<TransmitStatus, TransportError>;

    /// Queries how many bytes the service has persisted.
    async fn recover(&self, handle: &UploadHandle) -> Result<TransmitStatus, TransportError>;

    /// Cancels the upload session, discarding any persisted data.
    async fn abort(&self, handle: &UploadHandle) -> Result<(), TransportError>;
}

#[async_trait::async_trait]
impl<T: ResumableTransport + ?Sized> ResumableTransport for Arc<T> {
    fn alignment(&self) -> usize {
        self.as_ref().alignment()
    }

    async fn initiate(
        &self,
        target: &UploadTarget,
        metadata: &ObjectMetadata,
    ) -> Result<UploadHandle, TransportError> {
        self.as_ref().initiate(target, metadata).await
    }

    async fn transmit(
        &self,
        handle: &UploadHandle,
        chunk: &Chunk,
    ) -> Result<TransmitStatus, TransportError> {
        self.as_ref().transmit(handle, chunk).await
    }

    async fn recover(&self, handle: &UploadHandle) -> Result<TransmitStatus, TransportError> {
        self.as_ref().recover(handle).await
    }

    async fn abort(&self, handle: &UploadHandle) -> Result<(), TransportError> {
        self.as_ref().abort(handle).await
    }
}
