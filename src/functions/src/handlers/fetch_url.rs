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

use super::{
    Failure, HandlerResult, Pipeline, content_type, download_failure, get_source, upload_failure,
};
use crate::Error;
use crate::date_tokens::resolve_fetch_paths;
use crate::event::{self, FetchEvent};

/// Downloads the file named in a [FetchEvent] and uploads it to a bucket.
///
/// The whole file is held in memory, use [stream_url_to_bucket] for large
/// files.
///
/// [stream_url_to_bucket]: super::stream_url_to_bucket
pub async fn fetch_url_to_bucket(pipeline: &Pipeline, raw: &[u8]) -> HandlerResult {
    let event = decode_fetch_event(raw)?;
    let (source, destination) = resolve_paths(pipeline, &event)?;

    let response = get_source(pipeline, &source)
        .await
        .map_err(|e| download_failure(&source, e))?;
    let content_type = content_type(&response);
    let data = response
        .bytes()
        .await
        .map_err(|e| download_failure(&source, Error::io(e)))?;

    let uri = pipeline
        .store()
        .upload(&event.bucket_name, &destination, data, &content_type)
        .await
        .map_err(|e| upload_failure(&event.bucket_name, &destination, e))?;
    tracing::info!("copied {source} to {uri}");
    Ok(format!(
        "File {destination} uploaded to {}",
        event.bucket_name
    ))
}

pub(super) fn decode_fetch_event(raw: &[u8]) -> Result<FetchEvent, Failure> {
    event::decode::<FetchEvent>(raw)
        .map_err(|e| Failure::new("Error getting the variables from Pub/Sub", e))
}

pub(super) fn resolve_paths(
    pipeline: &Pipeline,
    event: &FetchEvent,
) -> Result<(String, String), Failure> {
    resolve_fetch_paths(
        &event.source_file_name,
        &event.destination_blob_name,
        event.datediff,
        pipeline.today(),
    )
    .map_err(|e| {
        Failure::new(
            format!(
                "Error processing date in filename: {} / {}",
                event.bucket_name, event.destination_blob_name
            ),
            e,
        )
    })
}
