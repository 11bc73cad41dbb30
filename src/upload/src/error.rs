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

//! Errors returned by upload sessions and resumable transports.
//!
//! A [TransportError] describes a single failed request. The session converts
//! it to a [gax::error::Error] and asks its
//! [RetryPolicy][gax::retry_policy::RetryPolicy] whether that failure is
//! retried or surfaces as an [UploadError].

use crate::model::UploadedObject;
use crate::session::SessionState;
use std::time::Duration;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failed request to the resumable upload endpoint.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The service responded with an unexpected HTTP status code.
    #[error("the service returned HTTP status {status}: {}", String::from_utf8_lossy(payload))]
    Http {
        status: u16,
        headers: http::HeaderMap,
        payload: bytes::Bytes,
    },

    /// The request could not be sent, or the response could not be received.
    #[error("cannot send the request or receive the response: {0}")]
    Io(#[source] BoxError),

    /// The attempt did not complete before its deadline.
    #[error("the request did not complete within {0:?}")]
    Timeout(Duration),

    /// The response arrived but its contents are not usable.
    #[error("cannot parse the response: {0}")]
    Deserialization(#[source] BoxError),

    /// The credentials could not produce authentication headers.
    #[error("cannot create the authentication headers: {0}")]
    Authentication(#[source] BoxError),

    /// The service accepted the request but persisted none of the chunk.
    #[error("the service persisted no bytes from the chunk at offset {offset}")]
    NoProgress { offset: u64 },
}

impl TransportError {
    pub fn http(status: u16, headers: http::HeaderMap, payload: bytes::Bytes) -> Self {
        Self::Http {
            status,
            headers,
            payload,
        }
    }

    pub fn io<T: Into<BoxError>>(source: T) -> Self {
        Self::Io(source.into())
    }

    pub fn deser<T: Into<BoxError>>(source: T) -> Self {
        Self::Deserialization(source.into())
    }

    pub fn authentication<T: Into<BoxError>>(source: T) -> Self {
        Self::Authentication(source.into())
    }

    /// The HTTP status code, if the service returned one.
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for failures that may succeed if the request is repeated.
    ///
    /// Request timeouts, throttling and server-side errors are transient, as
    /// are I/O problems, attempts that ran past their deadline, and responses
    /// that made no progress. Any other
    /// status code, malformed responses, and credential problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 408 | 429 | 500..600),
            Self::Io(_) | Self::Timeout(_) | Self::NoProgress { .. } => true,
            Self::Deserialization(_) | Self::Authentication(_) => false,
        }
    }
}

impl From<&TransportError> for gax::error::Error {
    fn from(value: &TransportError) -> Self {
        use gax::error::{CredentialsError, Error};
        match value {
            TransportError::Http {
                status,
                headers,
                payload,
            } => Error::http(*status, headers.clone(), payload.clone()),
            TransportError::Io(_) | TransportError::NoProgress { .. } => {
                Error::io(value.to_string())
            }
            TransportError::Timeout(_) => Error::timeout(value.to_string()),
            TransportError::Deserialization(_) => Error::deser(value.to_string()),
            TransportError::Authentication(_) => {
                Error::authentication(CredentialsError::from_msg(false, value.to_string()))
            }
        }
    }
}

/// A failed upload session operation.
///
/// Except for [InvalidChunkSize][UploadError::InvalidChunkSize],
/// [InvalidTarget][UploadError::InvalidTarget] and
/// [InvalidState][UploadError::InvalidState], every variant leaves the session
/// in the [Failed][SessionState::Failed] state. A failed session only accepts
/// `close()`, which does nothing, and `abort()`.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum UploadError {
    /// The chunk size is zero or not a multiple of the transport alignment.
    #[error("the chunk size ({chunk_size}) must be a positive multiple of {alignment}")]
    InvalidChunkSize { chunk_size: usize, alignment: usize },

    /// The bucket or object name is unusable.
    #[error("invalid upload target: {0}")]
    InvalidTarget(&'static str),

    /// The operation is not valid in the current session state.
    #[error("cannot {operation} an upload session in the {state:?} state")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The service did not create the upload session.
    #[error("cannot start the resumable upload session: {0}")]
    SessionInitiation(#[source] TransportError),

    /// A chunk failed with an error that is not worth retrying.
    #[error("cannot transmit the chunk at offset {offset}: {source}")]
    Transmission {
        offset: u64,
        #[source]
        source: TransportError,
    },

    /// A chunk kept failing until the retry policy gave up.
    #[error("giving up on the chunk at offset {offset} after {attempts} attempts: {source}")]
    RetryExhausted {
        offset: u64,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The service rejected the final chunk.
    #[error("cannot finalize the upload: {0}")]
    Finalization(#[source] TransportError),

    /// The service has "uncommitted" previously persisted bytes.
    ///
    /// # Troubleshoot
    ///
    /// The service previously reported more bytes as persisted than in its
    /// latest report. This indicates a bug in the service, a corrupted
    /// response, or a bug in this crate's range parsing.
    #[error(
        "the service previously persisted {offset} bytes, but now reports only {persisted} as persisted"
    )]
    UnexpectedRewind { offset: u64, persisted: u64 },

    /// The service reports more bytes persisted than sent.
    ///
    /// # Troubleshoot
    ///
    /// Most likely two writers share the same upload session.
    #[error("the service reports {persisted} bytes as persisted, but we only sent {sent} bytes")]
    TooMuchProgress { sent: u64, persisted: u64 },

    /// The service finalized the object while more data was pending.
    #[error("the service finalized {} after {sent} bytes, before the final chunk was sent", object.name)]
    UnexpectedFinalization {
        sent: u64,
        object: Box<UploadedObject>,
    },

    /// The session's cancellation token fired.
    #[error("the upload was cancelled")]
    Cancelled,

    /// The service did not cancel the upload session.
    #[error("cannot abort the upload session: {0}")]
    Abort(#[source] TransportError),
}

/// Errors creating a [GcsTransport][crate::gcs::GcsTransport].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum BuildError {
    #[error("cannot create the default credentials: {0}")]
    Credentials(#[source] google_cloud_auth::build_errors::Error),

    #[error("cannot create the HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
