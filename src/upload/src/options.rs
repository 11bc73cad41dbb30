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

use crate::model::ObjectMetadata;
use gax::backoff_policy::BackoffPolicy;
use gax::retry_policy::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The minimum chunk size accepted by Cloud Storage, and the default.
pub const RESUMABLE_UPLOAD_QUANTUM: usize = 256 * 1024;

/// Configures an [UploadSession][crate::session::UploadSession].
///
/// # Example
/// ```
/// # use pipeline_upload::options::*;
/// # use pipeline_upload::retry_policy::RetryableErrors;
/// use gax::retry_policy::RetryPolicyExt;
/// use std::time::Duration;
/// let options = UploadOptions::new()
///     .with_chunk_size(4 * RESUMABLE_UPLOAD_QUANTUM)
///     .with_content_type("text/csv")
///     .with_retry_policy(RetryableErrors.with_attempt_limit(3))
///     .with_attempt_timeout(Duration::from_secs(30));
/// assert_eq!(options.chunk_size(), 1024 * 1024);
/// ```
#[derive(Clone, Debug)]
pub struct UploadOptions {
    pub(crate) chunk_size: usize,
    pub(crate) metadata: ObjectMetadata,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) backoff_policy: Arc<dyn BackoffPolicy>,
    pub(crate) attempt_timeout: Option<Duration>,
    pub(crate) cancellation: CancellationToken,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn metadata(&self) -> &ObjectMetadata {
        &self.metadata
    }

    /// Sets the number of bytes sent in each non-final request.
    ///
    /// Must be a positive multiple of the transport alignment, sessions
    /// reject other values before contacting the service.
    pub fn with_chunk_size(mut self, v: usize) -> Self {
        self.chunk_size = v;
        self
    }

    pub fn with_content_type<T: Into<String>>(mut self, v: T) -> Self {
        self.metadata.content_type = Some(v.into());
        self
    }

    pub fn with_metadata(mut self, v: ObjectMetadata) -> Self {
        self.metadata = v;
        self
    }

    /// Sets the policy consulted after each failed chunk attempt.
    ///
    /// The default retries transient errors up to
    /// [DEFAULT_ATTEMPT_LIMIT][crate::retry_policy::DEFAULT_ATTEMPT_LIMIT]
    /// times per chunk.
    pub fn with_retry_policy<P: RetryPolicy + 'static>(mut self, v: P) -> Self {
        self.retry_policy = Arc::new(v);
        self
    }

    pub fn with_backoff_policy<P: BackoffPolicy + 'static>(mut self, v: P) -> Self {
        self.backoff_policy = Arc::new(v);
        self
    }

    /// Bounds each request, an attempt past the deadline is a transient error.
    pub fn with_attempt_timeout(mut self, v: Duration) -> Self {
        self.attempt_timeout = Some(v);
        self
    }

    /// Cancels any pending request, or backoff, when `v` is cancelled.
    pub fn with_cancellation_token(mut self, v: CancellationToken) -> Self {
        self.cancellation = v;
        self
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: RESUMABLE_UPLOAD_QUANTUM,
            metadata: ObjectMetadata::default(),
            retry_policy: Arc::new(crate::retry_policy::default()),
            backoff_policy: Arc::new(crate::backoff_policy::default()),
            attempt_timeout: None,
            cancellation: CancellationToken::new(),
        }
    }
}
