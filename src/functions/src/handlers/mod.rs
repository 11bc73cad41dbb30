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

//! The event handlers.
//!
//! Each handler consumes one raw event and returns either the success
//! message or a [Failure]. Failures carry the notification published to the
//! error topic, and the error that caused them.

mod fetch_url;
mod load_table;
mod stream_url;

pub use fetch_url::fetch_url_to_bucket;
pub use load_table::load_uri_to_warehouse;
pub use stream_url::stream_url_to_bucket;

use crate::Error;
use crate::bigquery::{BigQueryLoader, WarehouseLoader};
use crate::config::Config;
use crate::context::Context;
use crate::pubsub::{Notifier, PubsubPublisher};
use crate::storage::{ObjectStore, StorageClient};
use chrono::NaiveDate;
use std::sync::Arc;

// Used when the source does not declare a content type.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A failed event.
#[derive(thiserror::Error, Debug)]
#[error("{notification}")]
pub struct Failure {
    /// The message published to the error topic.
    pub notification: String,
    #[source]
    pub source: Error,
}

impl Failure {
    pub fn new<T: Into<String>>(notification: T, source: Error) -> Self {
        Self {
            notification: notification.into(),
            source,
        }
    }
}

/// The result of a handler, the success message or the failure.
pub type HandlerResult = std::result::Result<String, Failure>;

/// The collaborators available to the handlers.
#[derive(Clone, Debug)]
pub struct Pipeline {
    config: Config,
    http: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    loader: Arc<dyn WarehouseLoader>,
    today: Option<NaiveDate>,
}

impl Pipeline {
    /// Creates the production collaborators from `context`.
    pub fn new(context: &Context) -> Self {
        Self {
            config: context.config().clone(),
            http: context.http().clone(),
            store: Arc::new(StorageClient::new(context.clone())),
            notifier: Arc::new(PubsubPublisher::new(context.clone())),
            loader: Arc::new(BigQueryLoader::new(context.clone())),
            today: None,
        }
    }

    pub fn with_object_store<T: ObjectStore + 'static>(mut self, v: T) -> Self {
        self.store = Arc::new(v);
        self
    }

    pub fn with_notifier<T: Notifier + 'static>(mut self, v: T) -> Self {
        self.notifier = Arc::new(v);
        self
    }

    pub fn with_loader<T: WarehouseLoader + 'static>(mut self, v: T) -> Self {
        self.loader = Arc::new(v);
        self
    }

    /// Fixes the date used to replace date tokens.
    pub fn with_today(mut self, v: NaiveDate) -> Self {
        self.today = Some(v);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn loader(&self) -> &dyn WarehouseLoader {
        self.loader.as_ref()
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(crate::date_tokens::today)
    }
}

/// Selects the handler run by the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Handler {
    /// Downloads a file from a URL and uploads it to a bucket.
    FetchUrl,
    /// Streams a file from a URL into a bucket.
    StreamUrl,
    /// Loads a Cloud Storage object into a BigQuery table.
    LoadTable,
}

impl Handler {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchUrl => "fetch_url_to_bucket",
            Self::StreamUrl => "stream_url_to_bucket",
            Self::LoadTable => "load_uri_to_warehouse",
        }
    }

    pub async fn run(&self, pipeline: &Pipeline, raw: &[u8]) -> HandlerResult {
        match self {
            Self::FetchUrl => fetch_url_to_bucket(pipeline, raw).await,
            Self::StreamUrl => stream_url_to_bucket(pipeline, raw).await,
            Self::LoadTable => load_uri_to_warehouse(pipeline, raw).await,
        }
    }
}

/// Downloads the source of a fetch request, following redirects.
async fn get_source(pipeline: &Pipeline, url: &str) -> crate::Result<reqwest::Response> {
    tracing::info!("downloading {url}");
    let response = pipeline.http().get(url).send().await.map_err(Error::io)?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::Download {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(response)
}

fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

fn download_failure(url: &str, source: Error) -> Failure {
    Failure::new(format!("Error downloading file from url: {url}"), source)
}

fn upload_failure(bucket: &str, object: &str, source: Error) -> Failure {
    Failure::new(
        format!("Error uploading file to bucket: {bucket} / {object}"),
        source,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bigquery::MockWarehouseLoader;
    use crate::pubsub::MockNotifier;
    use crate::storage::MockObjectStore;
    use base64::Engine;
    use base64::prelude::BASE64_STANDARD;

    /// A pipeline where every collaborator is a mock without expectations.
    pub(crate) fn test_pipeline() -> Pipeline {
        Pipeline {
            config: Config::new("test-project")
                .with_output_topic("ok-topic")
                .with_error_topic("error-topic")
                .with_upload_chunk_size(pipeline_upload::options::RESUMABLE_UPLOAD_QUANTUM),
            http: reqwest::Client::new(),
            store: Arc::new(MockObjectStore::new()),
            notifier: Arc::new(MockNotifier::new()),
            loader: Arc::new(MockWarehouseLoader::new()),
            today: NaiveDate::from_ymd_opt(2024, 3, 10),
        }
    }

    /// Wraps `payload` in a background function event.
    pub(crate) fn event(payload: serde_json::Value) -> Vec<u8> {
        serde_json::json!({ "data": BASE64_STANDARD.encode(payload.to_string()) })
            .to_string()
            .into_bytes()
    }

    #[test]
    fn failure_display() {
        let failure = Failure::new(
            "Error downloading file from url: https://example.com",
            Error::Download {
                url: "https://example.com".into(),
                status: 404,
            },
        );
        assert_eq!(
            failure.to_string(),
            "Error downloading file from url: https://example.com"
        );
        let source = std::error::Error::source(&failure).map(|e| e.to_string());
        assert!(source.is_some_and(|s| s.contains("404")), "{failure:?}");
    }

    #[test]
    fn handler_names() {
        use clap::ValueEnum;
        let names = Handler::value_variants()
            .iter()
            .filter_map(|h| h.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, ["fetch-url", "stream-url", "load-table"]);
        assert_eq!(Handler::LoadTable.name(), "load_uri_to_warehouse");
    }

    #[test]
    fn today_override() {
        let pipeline = test_pipeline();
        assert_eq!(pipeline.today(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }
}
