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

//! Decides which failed chunk attempts are retried.
//!
//! Upload sessions use the [RetryPolicy] trait from `google-cloud-gax`. Each
//! failed request, including a response that persisted none of the chunk, is
//! converted to a [gax::error::Error] and passed to the policy. Use the
//! [RetryPolicyExt] decorators to bound the attempts or the time spent on a
//! single chunk.
//!
//! # Example
//! ```
//! # use pipeline_upload::retry_policy::RetryableErrors;
//! use gax::retry_policy::RetryPolicyExt;
//! use std::time::Duration;
//! let policy = RetryableErrors
//!     .with_attempt_limit(5)
//!     .with_time_limit(Duration::from_secs(300));
//! ```

use gax::error::Error;
use gax::retry_policy::{RetryPolicy, RetryPolicyExt};
use gax::retry_result::RetryResult;
use gax::retry_state::RetryState;

/// The default number of attempts for each chunk.
pub const DEFAULT_ATTEMPT_LIMIT: u32 = 10;

/// The default retry policy for upload sessions.
pub(crate) fn default() -> impl RetryPolicy {
    RetryableErrors.with_attempt_limit(DEFAULT_ATTEMPT_LIMIT)
}

/// Retries the errors Cloud Storage documents as retryable.
///
/// Chunk requests carry their offset, so repeating them is always safe. This
/// policy retries I/O errors, timeouts, and the 408, 429 and 5xx status codes.
/// It never stops on its own, decorate it with [RetryPolicyExt].
#[derive(Clone, Debug)]
pub struct RetryableErrors;

impl RetryPolicy for RetryableErrors {
    fn on_error(&self, _state: &RetryState, error: Error) -> RetryResult {
        if error.is_io() || error.is_timeout() {
            return RetryResult::Continue(error);
        }
        match error.http_status_code() {
            Some(408 | 429 | 500..600) => RetryResult::Continue(error),
            _ => RetryResult::Permanent(error),
        }
    }
}
