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

//! The error type for the pipeline collaborators and handlers.

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error calling a cloud service, or preparing the call.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required setting is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The event payload cannot be decoded.
    #[error("cannot decode the event: {0}")]
    Event(#[source] BoxError),

    /// A date token cannot be replaced.
    #[error("cannot replace the date tokens in `{template}`: {reason}")]
    DateToken {
        template: String,
        reason: &'static str,
    },

    /// A `gs://bucket/object` URI is malformed.
    #[error("invalid Cloud Storage URI `{0}`, expected gs://bucket/object")]
    InvalidUri(String),

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

    /// The response arrived but its contents are not usable.
    #[error("cannot parse the response: {0}")]
    Deserialization(#[source] BoxError),

    /// The credentials could not produce authentication headers.
    #[error("cannot create the authentication headers: {0}")]
    Authentication(#[source] BoxError),

    /// A streaming upload failed.
    #[error("cannot upload to {uri}: {source}")]
    Upload {
        uri: String,
        #[source]
        source: pipeline_upload::UploadError,
    },

    /// The source URL did not return the file.
    #[error("cannot download {url}: HTTP status {status}")]
    Download { url: String, status: u16 },

    /// A warehouse load job completed with an error, or did not complete.
    #[error("load job {job_id} failed: {reason}")]
    LoadJob { job_id: String, reason: String },

    /// The document store returned an unusable document.
    #[error("document store error: {0}")]
    Document(String),
}

impl Error {
    pub(crate) fn io<T: Into<BoxError>>(source: T) -> Self {
        Self::Io(source.into())
    }

    pub(crate) fn deser<T: Into<BoxError>>(source: T) -> Self {
        Self::Deserialization(source.into())
    }

    pub(crate) fn authentication<T: Into<BoxError>>(source: T) -> Self {
        Self::Authentication(source.into())
    }

    pub(crate) fn event<T: Into<BoxError>>(source: T) -> Self {
        Self::Event(source.into())
    }

    /// The HTTP status code, if the error carries one.
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Download { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Converts an unsuccessful response into an error.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(payload) => Self::Http {
                status,
                headers,
                payload,
            },
            Err(e) => Self::io(e),
        }
    }
}

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let err = Error::Http {
            status: 404,
            headers: http::HeaderMap::new(),
            payload: bytes::Bytes::from_static(b"not found"),
        };
        assert_eq!(err.http_status_code(), Some(404));
        assert!(err.to_string().contains("not found"), "{err}");

        let err = Error::Download {
            url: "https://example.com/data.csv".into(),
            status: 500,
        };
        assert_eq!(err.http_status_code(), Some(500));

        let err = Error::Config("PROJECT_ID is not set".into());
        assert_eq!(err.http_status_code(), None);
        assert!(err.to_string().contains("PROJECT_ID"), "{err}");
    }

    #[test]
    fn date_token_display() {
        let err = Error::DateToken {
            template: "data-$DATEDIFF.csv".into(),
            reason: "the date is out of range",
        };
        let fmt = err.to_string();
        assert!(fmt.contains("data-$DATEDIFF.csv"), "{fmt}");
        assert!(fmt.contains("out of range"), "{fmt}");
    }
}
