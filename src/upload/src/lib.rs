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

//! Streaming resumable uploads to Cloud Storage.
//!
//! An [UploadSession][session::UploadSession] accepts writes of any size and
//! uploads the data in fixed-size chunks, without ever holding the full
//! object in memory. Failed chunks are retried, resuming from the last byte
//! the service reports as persisted.
//!
//! Retries use the [RetryPolicy][gax::retry_policy::RetryPolicy] and
//! [BackoffPolicy][gax::backoff_policy::BackoffPolicy] traits from
//! `google-cloud-gax`, see [UploadOptions][options::UploadOptions].
//!
//! The wire protocol is behind the
//! [ResumableTransport][transport::ResumableTransport] trait.
//! [GcsTransport][gcs::GcsTransport] implements it for the Cloud Storage JSON
//! API.

mod backoff_policy;
mod buffer;
pub mod error;
pub mod gcs;
pub mod model;
pub mod options;
pub mod retry_policy;
pub mod session;
pub mod transport;

pub use error::{TransportError, UploadError};
pub use gcs::GcsTransport;
pub use model::{ObjectMetadata, UploadTarget, UploadedObject};
pub use options::UploadOptions;
pub use session::{SessionState, UploadSession};

/// The result type for upload sessions.
pub type Result<T> = std::result::Result<T, UploadError>;
