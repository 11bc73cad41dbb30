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

use super::fetch_url::{decode_fetch_event, resolve_paths};
use super::{
    Failure, HandlerResult, Pipeline, content_type, download_failure, get_source, upload_failure,
};
use crate::Error;
use futures::StreamExt;
use pipeline_upload::{SessionState, UploadError, UploadSession, UploadedObject};

/// Streams the file named in a [FetchEvent][crate::event::FetchEvent] into a
/// bucket.
///
/// The response body is written to a resumable upload as it arrives, only one
/// chunk is held in memory. If the copy fails after the upload starts, the
/// upload is aborted and no object is created.
pub async fn stream_url_to_bucket(pipeline: &Pipeline, raw: &[u8]) -> HandlerResult {
    let event = decode_fetch_event(raw)?;
    let (source, destination) = resolve_paths(pipeline, &event)?;
    let bucket = event.bucket_name.as_str();

    let response = get_source(pipeline, &source)
        .await
        .map_err(|e| download_failure(&source, e))?;
    let mut session = pipeline
        .store()
        .open_stream(
            bucket,
            &destination,
            pipeline.config().upload_chunk_size,
            Some(content_type(&response)),
        )
        .await
        .map_err(|e| upload_failure(bucket, &destination, e))?;

    match copy(response, &mut session, &source, bucket, &destination).await {
        Ok(object) => {
            tracing::info!("streamed {source} to {}", object.uri());
            Ok(format!("File {destination} uploaded to {bucket}"))
        }
        Err(failure) => {
            if let Err(e) = session.abort().await {
                tracing::warn!("cannot abort the upload to gs://{bucket}/{destination}: {e}");
            }
            Err(failure)
        }
    }
}

async fn copy(
    response: reqwest::Response,
    session: &mut UploadSession,
    source: &str,
    bucket: &str,
    destination: &str,
) -> Result<UploadedObject, Failure> {
    let to_failure = |source: UploadError| {
        upload_failure(
            bucket,
            destination,
            Error::Upload {
                uri: session_uri(bucket, destination),
                source,
            },
        )
    };
    let mut body = response.bytes_stream();
    while let Some(data) = body.next().await {
        let data = data.map_err(|e| download_failure(source, Error::io(e)))?;
        session.write(data).await.map_err(to_failure)?;
    }
    // `close()` only skips finalization when a previous write failed.
    session.close().await.map_err(to_failure)?.ok_or_else(|| {
        to_failure(UploadError::InvalidState {
            operation: "close",
            state: SessionState::Failed,
        })
    })
}

fn session_uri(bucket: &str, destination: &str) -> String {
    format!("gs://{bucket}/{destination}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use crate::handlers::tests::{event, test_pipeline};
    use crate::storage::StorageClient;
    use httptest::{Expectation, Server, all_of, matchers::*, responders::*};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    type Result = anyhow::Result<()>;

    const INITIATE: &str = "/upload/storage/v1/b/test-bucket/o";
    const SESSION: &str = "/upload/session/test-only";

    fn stream_event(server: &Server) -> Vec<u8> {
        event(json!({
            "source_file_name": server.url("/files/data-$DATEISO.csv").to_string(),
            "bucket_name": "test-bucket",
            "destination_blob_name": "raw/data.csv",
            "datediff": 0,
        }))
    }

    fn expect_source_and_initiate(server: &Server) {
        server.expect(
            Expectation::matching(request::method_path("GET", "/files/data-2024-03-10.csv"))
                .respond_with(
                    status_code(200)
                        .append_header("content-type", "text/csv")
                        .body("0123456789"),
                ),
        );
        let session = server.url(SESSION).to_string();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", INITIATE),
                request::query(url_decoded(contains(("name", "raw/data.csv")))),
                request::headers(contains(("x-upload-content-type", "text/csv"))),
            ])
            .respond_with(status_code(200).append_header("location", session)),
        );
    }

    #[tokio::test]
    async fn success() -> Result {
        let server = Server::run();
        expect_source_and_initiate(&server);
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes 0-9/10"))),
                request::body("0123456789"),
            ])
            .respond_with(json_encoded(json!({
                "bucket": "test-bucket",
                "name": "raw/data.csv",
                "size": "10",
            }))),
        );
        let pipeline =
            test_pipeline().with_object_store(StorageClient::new(test_context(&server)));
        let got = stream_url_to_bucket(&pipeline, &stream_event(&server)).await?;
        assert_eq!(got, "File raw/data.csv uploaded to test-bucket");
        Ok(())
    }

    #[tokio::test]
    async fn upload_error_aborts() -> Result {
        let server = Server::run();
        expect_source_and_initiate(&server);
        server.expect(
            Expectation::matching(request::method_path("PUT", SESSION))
                .respond_with(status_code(403).body("forbidden")),
        );
        server.expect(
            Expectation::matching(request::method_path("DELETE", SESSION))
                .times(1)
                .respond_with(status_code(499)),
        );
        let pipeline =
            test_pipeline().with_object_store(StorageClient::new(test_context(&server)));
        let err = stream_url_to_bucket(&pipeline, &stream_event(&server))
            .await
            .unwrap_err();
        assert_eq!(
            err.notification,
            "Error uploading file to bucket: test-bucket / raw/data.csv"
        );
        assert!(matches!(err.source, Error::Upload { .. }), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn download_error() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/files/data-2024-03-10.csv"))
                .respond_with(status_code(500)),
        );
        // The upload never starts, the default mock store has no expectations.
        let pipeline = test_pipeline();
        let err = stream_url_to_bucket(&pipeline, &stream_event(&server))
            .await
            .unwrap_err();
        assert!(
            err.notification.starts_with("Error downloading file from url: "),
            "{err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn initiate_error() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/files/data-2024-03-10.csv"))
                .respond_with(status_code(200).body("0123456789")),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", INITIATE))
                .respond_with(status_code(404).body("bucket not found")),
        );
        let pipeline =
            test_pipeline().with_object_store(StorageClient::new(test_context(&server)));
        let err = stream_url_to_bucket(&pipeline, &stream_event(&server))
            .await
            .unwrap_err();
        assert_eq!(
            err.notification,
            "Error uploading file to bucket: test-bucket / raw/data.csv"
        );
        Ok(())
    }
}
